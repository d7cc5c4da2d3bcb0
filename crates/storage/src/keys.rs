//! Local cache key layout.
//!
//! - `progress:<course>` / `progress:<course>:<user>`: serialized ledger
//! - `last_lesson` / `last_lesson:<user>`: last visited navigation target
//! - `progress_store` / `progress_store:<user>`: per-lesson reading state
//! - `last_access_date`, `current_streak`: device-wide streak counters
//!
//! Older installs kept the anonymous last visited target under
//! `last_lesson:anon`; it is read once and moved to `last_lesson`.

use progress_core::model::{CourseId, KEY_SEPARATOR, Scope};

pub const PROGRESS_PREFIX: &str = "progress";
pub const LAST_VISITED_PREFIX: &str = "last_lesson";
pub const LESSON_STORE_PREFIX: &str = "progress_store";
pub const LEGACY_ANON_LAST_VISITED_KEY: &str = "last_lesson:anon";
pub const LAST_ACCESS_DATE_KEY: &str = "last_access_date";
pub const CURRENT_STREAK_KEY: &str = "current_streak";

fn scoped(base: String, scope: &Scope) -> String {
    match scope {
        Scope::Anonymous => base,
        Scope::Identified(user) => format!("{base}{KEY_SEPARATOR}{user}"),
    }
}

#[must_use]
pub fn progress_key(course: &CourseId, scope: &Scope) -> String {
    scoped(format!("{PROGRESS_PREFIX}{KEY_SEPARATOR}{course}"), scope)
}

#[must_use]
pub fn last_visited_key(scope: &Scope) -> String {
    scoped(LAST_VISITED_PREFIX.to_owned(), scope)
}

#[must_use]
pub fn lesson_store_key(scope: &Scope) -> String {
    scoped(LESSON_STORE_PREFIX.to_owned(), scope)
}

/// Prefix shared by every progress ledger key.
#[must_use]
pub fn progress_prefix() -> String {
    format!("{PROGRESS_PREFIX}{KEY_SEPARATOR}")
}

/// Course of an anonymous-scope ledger key, `None` for any other key.
#[must_use]
pub fn anonymous_course(key: &str) -> Option<CourseId> {
    let rest = key.strip_prefix(&progress_prefix())?;
    if rest.contains(KEY_SEPARATOR) {
        return None;
    }
    CourseId::new(rest).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::UserId;

    fn course() -> CourseId {
        CourseId::new("html-fundamentals").unwrap()
    }

    fn user() -> Scope {
        Scope::Identified(UserId::new("u-42").unwrap())
    }

    #[test]
    fn progress_keys_are_scope_qualified() {
        assert_eq!(progress_key(&course(), &Scope::Anonymous), "progress:html-fundamentals");
        assert_eq!(progress_key(&course(), &user()), "progress:html-fundamentals:u-42");
    }

    #[test]
    fn last_visited_keys_never_collide() {
        assert_eq!(last_visited_key(&Scope::Anonymous), "last_lesson");
        assert_eq!(last_visited_key(&user()), "last_lesson:u-42");
    }

    #[test]
    fn lesson_store_keys_stay_out_of_ledger_prefix() {
        assert_eq!(lesson_store_key(&Scope::Anonymous), "progress_store");
        assert_eq!(lesson_store_key(&user()), "progress_store:u-42");
        assert!(!lesson_store_key(&user()).starts_with(&progress_prefix()));
        assert_eq!(anonymous_course("progress_store"), None);
    }

    #[test]
    fn recognises_only_anonymous_ledger_keys() {
        assert_eq!(anonymous_course("progress:html-fundamentals"), Some(course()));
        assert_eq!(anonymous_course("progress:html-fundamentals:u-42"), None);
        assert_eq!(anonymous_course("last_lesson"), None);
        assert_eq!(anonymous_course("progress:"), None);
    }
}
