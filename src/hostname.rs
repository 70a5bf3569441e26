//! Deterministic hostname assignment for instances in a batch.
//!
//! A name template may contain one substitution marker, written `%s` or a
//! bare `%`. The marker is replaced with the decimal index. A template with
//! no marker, or with more than one, cannot be formatted and is used verbatim
//! for every instance.

/// Marker character that introduces a substitution.
pub const MARKER: char = '%';

/// Substitutes `index` into `template`.
///
/// The template is returned unchanged unless it holds exactly one marker.
///
/// # Examples
///
/// ```
/// use fleetup::hostname::increment;
///
/// assert_eq!(increment("web-%s.example.com", 1), "web-1.example.com");
/// assert_eq!(increment("web-%.example.com", 2), "web-2.example.com");
/// assert_eq!(increment("bastion", 7), "bastion");
/// assert_eq!(increment("db-%s-%s", 4), "db-%s-%s");
/// ```
#[must_use]
pub fn increment(template: &str, index: i64) -> String {
    if !has_marker(template) {
        return template.to_owned();
    }
    let Some((prefix, rest)) = template.split_once(MARKER) else {
        return template.to_owned();
    };
    let suffix = rest.strip_prefix('s').unwrap_or(rest);
    format!("{prefix}{index}{suffix}")
}

/// Returns `true` when `template` holds exactly one substitution marker,
/// i.e. when [`increment`] yields a distinct name per index.
#[must_use]
pub fn has_marker(template: &str) -> bool {
    template.matches(MARKER).count() == 1
}

/// Computes the hostname for the instance at `offset` within the batch.
///
/// Returns `None` when no template was supplied, or when `seed + offset`
/// does not fit in an `i64`.
#[must_use]
pub fn assign(template: Option<&str>, seed: i64, offset: u32) -> Option<String> {
    let index = seed.checked_add(i64::from(offset))?;
    template.map(|value| increment(value, index))
}
