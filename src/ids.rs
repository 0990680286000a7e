use std::collections::HashSet;

/// Source of collision-free string identifiers for new entities.
pub trait IdGenerator: Send + Sync {
    fn next_id(&mut self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&mut self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic `<prefix><n>` ids, skipping anything already reserved.
#[derive(Debug, Clone)]
pub struct SequentialIds {
    prefix: String,
    counter: u64,
    reserved: HashSet<String>,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: 0,
            reserved: HashSet::new(),
        }
    }

    pub fn reserve(&mut self, id: impl Into<String>) {
        self.reserved.insert(id.into());
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new("id_")
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> String {
        loop {
            self.counter += 1;
            let candidate = format!("{}{}", self.prefix, self.counter);
            if self.reserved.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_skip_reserved() {
        let mut ids = SequentialIds::new("n");
        ids.reserve("n2");
        assert_eq!(ids.next_id(), "n1");
        assert_eq!(ids.next_id(), "n3");
    }

    #[test]
    fn uuid_ids_are_unique() {
        let mut ids = UuidIds;
        assert_ne!(ids.next_id(), ids.next_id());
    }
}
