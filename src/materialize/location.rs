// src/materialize/location.rs

use uuid::Uuid;

/// Hands out output location ids.
///
/// Ids are UUIDv7 strings: they sort by creation time, and this generator
/// additionally guarantees that every id it returns sorts strictly after the
/// previous one, even within the same millisecond.
#[derive(Debug, Default)]
pub struct LocationIdGenerator {
    last: Option<Uuid>,
}

impl LocationIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> String {
        let mut id = Uuid::now_v7();
        if let Some(last) = self.last {
            if id <= last {
                // Bump the random tail; the version and variant bits live
                // above it.
                id = Uuid::from_u128(last.as_u128() + 1);
            }
        }
        self.last = Some(id);
        id.hyphenated().to_string()
    }
}
