use chrono::NaiveDateTime;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Source of the timestamp embedded in derived tags.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Wall-clock time in the local timezone.
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Pick the release tag: the explicit one verbatim, or `{branch}-{YYYYMMDDHHMMSS}`.
pub fn derive_tag(explicit: Option<&str>, branch: &str, now: NaiveDateTime) -> String {
    match explicit {
        Some(tag) => tag.to_string(),
        None => format!("{}-{}", branch.trim_end(), now.format(TIMESTAMP_FORMAT)),
    }
}
