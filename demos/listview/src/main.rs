//! Renders a keyed task list through a few updates and prints the markup
//! plus the document's mutation counter after each pass, to show how little
//! DOM each re-render touches.

use lumen_core::{Error, RenderRoot, TemplateResult, Value, html, repeat};
use lumen_dom::Document;

#[derive(Clone)]
struct Task {
    id: i64,
    label: String,
    done: bool,
}

impl Task {
    fn new(id: i64, label: &str) -> Self {
        Self {
            id,
            label: label.to_string(),
            done: false,
        }
    }
}

fn task_view(task: &Task) -> TemplateResult {
    html!(
        ["<li ?data-done=", ">", "</li>"],
        task.done,
        task.label.as_str()
    )
}

fn list_view(tasks: &[Task]) -> TemplateResult {
    html!(
        ["<h1>", "</h1><ul>", "</ul>"],
        format!("{} task(s)", tasks.len()),
        repeat(tasks.to_vec(), |t| t.id, |t, _| Value::from(task_view(t)))
    )
}

fn main() -> Result<(), Error> {
    let doc = Document::new();
    let container = doc.create_element("main");
    let root = RenderRoot::new(&container)?;

    let mut tasks = vec![
        Task::new(1, "write the parser"),
        Task::new(2, "wire up the differ"),
        Task::new(3, "ship it"),
    ];

    root.render(list_view(&tasks))?;
    report(&doc, &container, "initial render");

    tasks[0].done = true;
    root.render(list_view(&tasks))?;
    report(&doc, &container, "mark first task done");

    tasks.swap(1, 2);
    root.render(list_view(&tasks))?;
    report(&doc, &container, "swap the last two");

    tasks.remove(0);
    tasks.push(Task::new(4, "celebrate"));
    root.render(list_view(&tasks))?;
    report(&doc, &container, "drop one, add one");

    Ok(())
}

fn report(doc: &Document, container: &lumen_dom::NodeRef, step: &str) {
    println!("== {step} (total mutations so far: {})", doc.mutation_count());
    println!("{}\n", container.inner_html().replace("<!---->", ""));
}
