use std::cmp::Ordering;

/// A concrete or wildcard media type, e.g. `text/html` or `text/*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub kind: String,
    pub subtype: String,
}

impl MediaType {
    pub fn new(kind: &str, subtype: &str) -> Self {
        MediaType {
            kind: kind.to_string(),
            subtype: subtype.to_string(),
        }
    }

    /// The `*/*` sentinel returned when nothing in an Accept header matches
    /// any candidate.
    pub fn any() -> Self {
        MediaType::new("*", "*")
    }

    pub fn is_any(&self) -> bool {
        self.kind == "*" && self.subtype == "*"
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    media: MediaType,
    q: f32,
}

/// A parsed `Accept` header, entries held in descending preference order.
#[derive(Debug, Clone)]
pub struct AcceptValues {
    entries: Vec<Entry>,
}

impl AcceptValues {
    /// Parse a raw header value. Entries are comma-separated
    /// `type/subtype` pairs with an optional `;q=` weight; malformed
    /// entries are silently dropped.
    pub fn parse(raw: &str) -> Self {
        let mut entries: Vec<Entry> = raw.split(',').filter_map(parse_entry).collect();
        // The preference order is partial; only a stable sort keeps
        // incomparable entries in header order.
        entries.sort_by(preference);
        AcceptValues { entries }
    }

    /// Walk the header in preference order and return the first candidate
    /// equal to an entry. Candidates are matched literally, wildcards
    /// included. Returns the `*/*` sentinel when nothing matches; callers
    /// fall back to their default.
    pub fn highest_in(&self, candidates: &[MediaType]) -> MediaType {
        for entry in &self.entries {
            if let Some(found) = candidates.iter().find(|c| **c == entry.media) {
                return found.clone();
            }
        }
        MediaType::any()
    }
}

/// Descending preference: higher q first; at equal q a concrete type beats
/// `*`, then a concrete subtype beats `*`. Anything else is incomparable.
fn preference(a: &Entry, b: &Entry) -> Ordering {
    match b.q.partial_cmp(&a.q) {
        Some(Ordering::Equal) | None => {}
        Some(ord) => return ord,
    }
    match (a.media.kind == "*", b.media.kind == "*") {
        (false, true) => return Ordering::Less,
        (true, false) => return Ordering::Greater,
        _ => {}
    }
    match (a.media.subtype == "*", b.media.subtype == "*") {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn parse_entry(item: &str) -> Option<Entry> {
    let mut params = item.split(';');
    let range = params.next()?.trim();
    let (kind, subtype) = range.split_once('/')?;
    let kind = kind.trim();
    let subtype = subtype.trim();
    if !valid_token(kind) || !valid_token(subtype) {
        return None;
    }

    let mut q = 1.0f32;
    for param in params {
        // The only parameter the grammar admits is a q weight.
        let value = param.trim().strip_prefix("q=")?;
        q = value.trim().parse().ok()?;
    }

    Some(Entry {
        media: MediaType::new(kind, subtype),
        q,
    })
}

/// A token is `*` or one or more characters from `[A-Za-z+-]`.
fn valid_token(token: &str) -> bool {
    token == "*"
        || (!token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphabetic() || c == '+' || c == '-'))
}
