//! Keyed list rendering. Each item's part is tied to its key, so reorders
//! move the existing DOM instead of rewriting it; DOM moves are proportional
//! to how many items actually changed position, never to the list length.

use hashbrown::HashMap;

use crate::directive::{BoundPart, Directive, DirectiveResult, PartInfo, PartKind};
use crate::error::Error;
use crate::helpers::{insert_part, move_part, remove_part};
use crate::part::ChildPart;
use crate::value::{Key, Value};

/// Renders `items` as a keyed list. `key_of` must give each item an identity
/// that is stable across renders; `template` produces the item's value. Only
/// valid in child bindings.
///
/// Duplicate keys get a warning and fall back to treating the later
/// occurrences as fresh items, so rendering still succeeds.
pub fn repeat<T, K: Into<Key>, R: Into<Value>>(
    items: impl IntoIterator<Item = T>,
    key_of: impl Fn(&T) -> K,
    template: impl Fn(&T, usize) -> R,
) -> Value {
    let mut args = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        args.push(key_of(&item).into().into_value());
        args.push(template(&item, index).into());
    }
    Value::Directive(DirectiveResult::new(
        "repeat",
        |info: &PartInfo| {
            if info.kind != PartKind::Child {
                return Err(Error::InvalidPartKind {
                    directive: "repeat",
                    kind: info.kind,
                });
            }
            Ok(RepeatDirective::default())
        },
        args,
    ))
}

#[derive(Default)]
struct RepeatDirective {
    items: Vec<(Key, ChildPart)>,
}

/// Four-pointer diff over the old and new key sequences: converge matching
/// heads and tails in place, handle head/tail swaps with single moves, and
/// fall back to a key-to-index map for arbitrary moves. Consumed old slots
/// are tombstoned with `None` so the pointers can skip them.
impl Directive for RepeatDirective {
    fn update(&mut self, part: BoundPart<'_>, args: &[Value]) -> Result<Value, Error> {
        let BoundPart::Child(container) = part else {
            return Err(Error::InvalidPartKind {
                directive: "repeat",
                kind: PartKind::Child,
            });
        };

        let mut new_keys = Vec::with_capacity(args.len() / 2);
        let mut new_values: Vec<Option<Value>> = Vec::with_capacity(args.len() / 2);
        let mut new_key_to_index: HashMap<Key, usize> = HashMap::new();
        for (index, pair) in args.chunks(2).enumerate() {
            let key = pair
                .first()
                .and_then(Key::from_value)
                .ok_or_else(|| Error::Directive("repeat key must be keyable".to_string()))?;
            let value = pair
                .get(1)
                .cloned()
                .ok_or_else(|| Error::Directive("repeat item without a value".to_string()))?;
            if new_key_to_index.contains_key(&key) {
                log::warn!("repeat: duplicate key {key:?}; treating later occurrence as a new item");
            } else {
                new_key_to_index.insert(key.clone(), index);
            }
            new_keys.push(key);
            new_values.push(Some(value));
        }

        let mut old: Vec<Option<(Key, ChildPart)>> =
            std::mem::take(&mut self.items).into_iter().map(Some).collect();
        let mut new_parts: Vec<Option<(Key, ChildPart)>> = vec![None; new_keys.len()];

        let mut old_head = 0isize;
        let mut old_tail = old.len() as isize - 1;
        let mut new_head = 0isize;
        let mut new_tail = new_keys.len() as isize - 1;
        // Built only if the pointers stop converging.
        let mut old_key_to_index: Option<HashMap<Key, usize>> = None;

        let take_value = |values: &mut Vec<Option<Value>>, i: isize| -> Result<Value, Error> {
            values
                .get_mut(i as usize)
                .and_then(Option::take)
                .ok_or_else(|| Error::Directive("repeat value consumed twice".to_string()))
        };

        while old_head <= old_tail && new_head <= new_tail {
            if old[old_head as usize].is_none() {
                old_head += 1;
            } else if old[old_tail as usize].is_none() {
                old_tail -= 1;
            } else if key_at(&old, old_head) == Some(&new_keys[new_head as usize]) {
                let Some((key, part)) = old[old_head as usize].take() else { break };
                part.commit(take_value(&mut new_values, new_head)?)?;
                new_parts[new_head as usize] = Some((key, part));
                old_head += 1;
                new_head += 1;
            } else if key_at(&old, old_tail) == Some(&new_keys[new_tail as usize]) {
                let Some((key, part)) = old[old_tail as usize].take() else { break };
                part.commit(take_value(&mut new_values, new_tail)?)?;
                new_parts[new_tail as usize] = Some((key, part));
                old_tail -= 1;
                new_tail -= 1;
            } else if key_at(&old, old_head) == Some(&new_keys[new_tail as usize]) {
                // Old head moved to the current tail of the new window.
                let Some((key, part)) = old[old_head as usize].take() else { break };
                move_part(container, &part, part_at(&new_parts, new_tail + 1));
                part.commit(take_value(&mut new_values, new_tail)?)?;
                new_parts[new_tail as usize] = Some((key, part));
                old_head += 1;
                new_tail -= 1;
            } else if key_at(&old, old_tail) == Some(&new_keys[new_head as usize]) {
                // Old tail moved to the current head of the new window.
                let Some((key, part)) = old[old_tail as usize].take() else { break };
                move_part(container, &part, old_part_at(&old, old_head));
                part.commit(take_value(&mut new_values, new_head)?)?;
                new_parts[new_head as usize] = Some((key, part));
                old_tail -= 1;
                new_head += 1;
            } else {
                let map = old_key_to_index.get_or_insert_with(|| {
                    let mut map = HashMap::new();
                    for i in old_head..=old_tail {
                        if let Some((key, _)) = &old[i as usize] {
                            map.entry(key.clone()).or_insert(i as usize);
                        }
                    }
                    map
                });
                if key_at(&old, old_head)
                    .is_some_and(|k| !new_key_to_index.contains_key(k))
                {
                    if let Some((_, part)) = old[old_head as usize].take() {
                        remove_part(&part);
                    }
                    old_head += 1;
                } else if key_at(&old, old_tail)
                    .is_some_and(|k| !new_key_to_index.contains_key(k))
                {
                    if let Some((_, part)) = old[old_tail as usize].take() {
                        remove_part(&part);
                    }
                    old_tail -= 1;
                } else {
                    // Arbitrary move or a genuinely new item; either way it
                    // lands right before the current old head.
                    let key = new_keys[new_head as usize].clone();
                    let moved = map
                        .get(&key)
                        .copied()
                        .and_then(|i| old.get_mut(i).and_then(Option::take));
                    let part = match moved {
                        Some((_, part)) => {
                            move_part(container, &part, old_part_at(&old, old_head));
                            part
                        }
                        None => insert_part_before_old(container, &old, old_head)?,
                    };
                    part.commit(take_value(&mut new_values, new_head)?)?;
                    new_parts[new_head as usize] = Some((key, part));
                    new_head += 1;
                }
            }
        }

        // New items left over once the old range is exhausted.
        while new_head <= new_tail {
            let before_start = part_at(&new_parts, new_tail + 1).map(ChildPart::start);
            let part = container.insert_nested(before_start.as_ref())?;
            part.commit(take_value(&mut new_values, new_head)?)?;
            new_parts[new_head as usize] = Some((new_keys[new_head as usize].clone(), part));
            new_head += 1;
        }
        // Old items no new key claimed.
        while old_head <= old_tail {
            if let Some((_, part)) = old[old_head as usize].take() {
                remove_part(&part);
            }
            old_head += 1;
        }

        self.items = new_parts.into_iter().flatten().collect();
        Ok(Value::NoChange)
    }

    fn set_connected(&mut self, connected: bool) {
        for (_, part) in &self.items {
            part.set_connected(connected);
        }
    }
}

fn key_at(old: &[Option<(Key, ChildPart)>], index: isize) -> Option<&Key> {
    old.get(index as usize)
        .and_then(|slot| slot.as_ref())
        .map(|(key, _)| key)
}

fn old_part_at(old: &[Option<(Key, ChildPart)>], index: isize) -> Option<&ChildPart> {
    old.get(index as usize)
        .and_then(|slot| slot.as_ref())
        .map(|(_, part)| part)
}

fn part_at(parts: &[Option<(Key, ChildPart)>], index: isize) -> Option<&ChildPart> {
    parts
        .get(index as usize)
        .and_then(|slot| slot.as_ref())
        .map(|(_, part)| part)
}

fn insert_part_before_old(
    container: &ChildPart,
    old: &[Option<(Key, ChildPart)>],
    old_head: isize,
) -> Result<ChildPart, Error> {
    insert_part(container, old_part_at(old, old_head))
}
