//! Expression name resolution across rig naming conventions.
//!
//! Avatar models name the same expression differently (`happy` vs the older
//! `joy`, `aa` vs `a` vs `A`). Resolution is a pure lookup over a static
//! table so it can be tested without a rig.

use super::ExpressionRig;
use tracing::debug;

/// Alternate names to try, in order, when a model lacks the requested one.
const FALLBACKS: &[(&str, &[&str])] = &[
    ("happy", &["joy", "Joy", "Happy"]),
    ("joy", &["happy"]),
    ("sad", &["sorrow", "Sorrow", "Sad"]),
    ("sorrow", &["sad"]),
    ("relaxed", &["fun", "Fun", "Relaxed"]),
    ("fun", &["relaxed"]),
    ("angry", &["Angry"]),
    ("surprised", &["surprise", "Surprised"]),
    ("neutral", &["Neutral"]),
    ("aa", &["a", "A"]),
    ("ih", &["i", "I"]),
    ("ou", &["u", "U"]),
    ("ee", &["e", "E"]),
    ("oh", &["o", "O"]),
    ("a", &["aa"]),
    ("i", &["ih"]),
    ("u", &["ou"]),
    ("e", &["ee"]),
    ("o", &["oh"]),
];

/// Alternates for `name`, empty when there is no table entry.
pub fn fallbacks_for(name: &str) -> &'static [&'static str] {
    FALLBACKS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, alts)| *alts)
        .unwrap_or(&[])
}

/// Concrete name to set for `requested`, given what the model supports.
pub fn resolve_expression<'a>(requested: &'a str, supports: impl Fn(&str) -> bool) -> Option<&'a str> {
    if supports(requested) {
        return Some(requested);
    }
    fallbacks_for(requested).iter().copied().find(|alt| supports(alt))
}

/// Set an expression through the fallback table.
///
/// Returns `false` when neither the name nor any alternate exists on the
/// model, or the rig refused the value. Never panics; a `false` simply
/// means "no visible effect".
pub fn try_set_expression(rig: &dyn ExpressionRig, name: &str, weight: f32) -> bool {
    let Some(resolved) = resolve_expression(name, |n| rig.supports(n)) else {
        debug!("expression '{name}' not on model and no fallback matched");
        return false;
    };
    if resolved != name {
        debug!("expression '{name}' routed to '{resolved}'");
    }
    rig.set_expression(resolved, weight.clamp(0.0, 1.0))
}
