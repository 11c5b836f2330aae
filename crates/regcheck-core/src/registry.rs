use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::info;

use crate::{Error, Rule, RuleKind};

/// In-memory set of active rules, keyed by id, in insertion order.
///
/// Shared between request handlers as `Arc<RuleRegistry>`. Every mutation
/// validates and applies under a single write lock, so a batch either lands
/// whole or not at all. Contents do not survive a restart.
#[derive(Debug)]
pub struct RuleRegistry {
    kind: RuleKind,
    rules: RwLock<Vec<Rule>>,
}

impl RuleRegistry {
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            rules: RwLock::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    /// Append a batch. Rejects the whole batch if any id is already
    /// registered or repeats within the batch.
    pub fn add(&self, batch: Vec<Rule>) -> Result<Vec<String>, Error> {
        validate_ids(&batch)?;

        let mut rules = self.rules.write();
        let mut seen: HashSet<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        for rule in &batch {
            if !seen.insert(rule.id.as_str()) {
                return Err(Error::DuplicateRule(rule.id.clone()));
            }
        }

        let ids: Vec<String> = batch.iter().map(|r| r.id.clone()).collect();
        rules.extend(batch);
        info!(kind = self.kind.label(), added = ids.len(), total = rules.len(), "rules added");
        Ok(ids)
    }

    /// Replace the registry contents with `batch`. Repeated ids inside the
    /// batch resolve last-write-wins, keeping the first occurrence's position.
    pub fn replace(&self, batch: Vec<Rule>) -> Result<usize, Error> {
        validate_ids(&batch)?;

        let mut deduped: Vec<Rule> = Vec::with_capacity(batch.len());
        for rule in batch {
            match deduped.iter_mut().find(|r| r.id == rule.id) {
                Some(existing) => existing.description = rule.description,
                None => deduped.push(rule),
            }
        }

        let mut rules = self.rules.write();
        *rules = deduped;
        info!(kind = self.kind.label(), total = rules.len(), "rules replaced");
        Ok(rules.len())
    }

    /// Snapshot of the current rules in insertion order.
    pub fn list(&self) -> Vec<Rule> {
        self.rules.read().clone()
    }

    /// Remove every rule with this id. Absent ids are a no-op.
    pub fn delete(&self, id: &str) -> String {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        info!(
            kind = self.kind.label(),
            id,
            removed = before - rules.len(),
            "rule delete"
        );
        id.to_string()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

fn validate_ids(batch: &[Rule]) -> Result<(), Error> {
    match batch.iter().find(|r| r.id.trim().is_empty()) {
        Some(rule) => Err(Error::InvalidRule(format!(
            "rule id must not be blank (description: {:?})",
            rule.description
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn registry() -> RuleRegistry {
        RuleRegistry::new(RuleKind::Regulation)
    }

    #[test]
    fn add_appends_in_order() {
        let reg = registry();
        let ids = reg
            .add(vec![Rule::new("GDPR-5", "no PII logging"), Rule::new("SOC2-CC6.1", "TLS only")])
            .unwrap();
        assert_eq!(ids, vec!["GDPR-5".to_string(), "SOC2-CC6.1".to_string()]);

        reg.add(vec![Rule::new("GDPR-17", "right to be forgotten")]).unwrap();
        let listed: Vec<String> = reg.list().into_iter().map(|r| r.id).collect();
        assert_eq!(listed, vec!["GDPR-5", "SOC2-CC6.1", "GDPR-17"]);
    }

    #[test]
    fn duplicate_id_rejects_batch_without_mutation() {
        let reg = registry();
        reg.add(vec![Rule::new("GDPR-5", "no PII logging")]).unwrap();

        let err = reg
            .add(vec![Rule::new("NEW-1", "fresh"), Rule::new("GDPR-5", "again")])
            .unwrap_err();
        assert_eq!(err, Error::DuplicateRule("GDPR-5".into()));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.list()[0].description, "no PII logging");
    }

    #[test]
    fn duplicate_inside_batch_is_rejected() {
        let reg = registry();
        let err = reg
            .add(vec![Rule::new("A", "one"), Rule::new("A", "two")])
            .unwrap_err();
        assert_eq!(err, Error::DuplicateRule("A".into()));
        assert!(reg.is_empty());
    }

    #[test]
    fn blank_id_is_rejected() {
        let reg = registry();
        assert!(matches!(
            reg.add(vec![Rule::new("  ", "blank")]),
            Err(Error::InvalidRule(_))
        ));
        assert!(matches!(
            reg.replace(vec![Rule::new("", "blank")]),
            Err(Error::InvalidRule(_))
        ));
    }

    #[test]
    fn delete_missing_id_is_noop() {
        let reg = registry();
        reg.add(vec![Rule::new("A", "one")]).unwrap();
        assert_eq!(reg.delete("missing"), "missing");
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.delete("A"), "A");
        assert!(reg.is_empty());
    }

    #[test]
    fn replace_is_last_write_wins() {
        let reg = registry();
        reg.add(vec![Rule::new("OLD", "gone after replace")]).unwrap();

        let total = reg
            .replace(vec![
                Rule::new("A", "first"),
                Rule::new("B", "second"),
                Rule::new("A", "updated"),
            ])
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(
            reg.list(),
            vec![Rule::new("A", "updated"), Rule::new("B", "second")]
        );
    }

    #[test]
    fn list_is_a_snapshot() {
        let reg = registry();
        reg.add(vec![Rule::new("A", "one")]).unwrap();
        let snapshot = reg.list();
        reg.delete("A");
        assert_eq!(snapshot.len(), 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn concurrent_adds_of_same_id_admit_exactly_one() {
        let reg = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || reg.add(vec![Rule::new("SAME", format!("writer {i}"))]))
            })
            .collect();
        let ok = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count();
        assert_eq!(ok, 1);
        assert_eq!(reg.len(), 1);
    }
}
