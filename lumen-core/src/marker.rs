use std::hash::{BuildHasher, RandomState};
use std::sync::OnceLock;

/// Suffix appended to a bound attribute's name during compilation so the
/// instantiator can recognize it after parsing. The sigil character (if any)
/// survives in the recorded attribute-name list, not in the markup.
pub(crate) const BOUND_ATTR_SUFFIX: &str = "$lum$";

static MARKER: OnceLock<String> = OnceLock::new();

/// Process-wide expression marker. Seeded from a random hash so literal
/// template text cannot collide with it; only letters, digits and `$`, which
/// keeps it legal inside comments, attribute names and attribute values.
pub(crate) fn marker() -> &'static str {
    MARKER.get_or_init(|| {
        let seed = RandomState::new().hash_one(0u64) & 0xffff_ffff_ffff;
        format!("lum${seed:012x}$")
    })
}
