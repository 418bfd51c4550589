//! Choice bookkeeping for chapter menus.
//!
//! A script builds a [`ChoiceSet`] one `AddChoice` at a time, attaches
//! per-language labels, and finally commits it for presentation. Selection is
//! tracked per group independently of which set is currently being built, so
//! a default chosen before the commit survives it and a click on the overlay
//! is visible to the next script that asks for the group's choice.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;
use thiserror::Error;

pub type ChoiceUid = String;
pub type ChoiceGroup = Option<String>;

/// Registry shared between the script host and the overlay.
pub type SharedChoices = Rc<RefCell<ChoiceRegistry>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChapterChoice {
    pub per_language_text: BTreeMap<String, String>,
    pub group: ChoiceGroup,
}

impl ChapterChoice {
    pub fn new(group: ChoiceGroup) -> Self {
        Self {
            per_language_text: BTreeMap::new(),
            group,
        }
    }

    /// Exact-match lookup; there is no language fallback.
    pub fn text(&self, language: &str) -> Option<&str> {
        self.per_language_text.get(language).map(String::as_str)
    }

    /// Label used when drawing: the requested language, then the first
    /// language in code order.
    pub fn display_text(&self, language: &str) -> Option<&str> {
        self.text(language).or_else(|| {
            self.per_language_text
                .values()
                .next()
                .map(String::as_str)
        })
    }
}

pub type ChoiceSet = BTreeMap<ChoiceUid, ChapterChoice>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("the choice with uid '{uid}' does not exist")]
pub struct ChoiceLookupMiss {
    pub uid: ChoiceUid,
}

#[derive(Debug, Default)]
pub struct ChoiceRegistry {
    building: ChoiceSet,
    committed: ChoiceSet,
    selection: BTreeMap<ChoiceGroup, ChoiceUid>,
}

impl ChoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedChoices {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Installs a fresh entry for `uid`, replacing any previous one with the
    /// same uid (its texts included).
    pub fn add_choice(&mut self, uid: impl Into<ChoiceUid>, group: ChoiceGroup) {
        self.building.insert(uid.into(), ChapterChoice::new(group));
    }

    pub fn set_choice_text(
        &mut self,
        uid: &str,
        language: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), ChoiceLookupMiss> {
        let choice = self.building.get_mut(uid).ok_or_else(|| ChoiceLookupMiss {
            uid: uid.to_string(),
        })?;
        choice.per_language_text.insert(language.into(), text.into());
        Ok(())
    }

    /// Last write wins; the uid is not checked against any set.
    pub fn set_selected(&mut self, uid: impl Into<ChoiceUid>, group: ChoiceGroup) {
        self.selection.insert(group, uid.into());
    }

    pub fn selected(&self, group: &ChoiceGroup) -> Option<&str> {
        self.selection.get(group).map(String::as_str)
    }

    pub fn is_selected(&self, uid: &str, group: &ChoiceGroup) -> bool {
        self.selected(group) == Some(uid)
    }

    pub fn selections(&self) -> &BTreeMap<ChoiceGroup, ChoiceUid> {
        &self.selection
    }

    pub fn choice(&self, uid: &str) -> Option<&ChapterChoice> {
        self.building.get(uid)
    }

    pub fn text(&self, uid: &str, language: &str) -> Option<&str> {
        self.building.get(uid).and_then(|choice| choice.text(language))
    }

    /// Choices added since the last commit.
    pub fn choices(&self) -> &ChoiceSet {
        &self.building
    }

    pub fn committed(&self) -> &ChoiceSet {
        &self.committed
    }

    pub fn len(&self) -> usize {
        self.building.len()
    }

    pub fn is_empty(&self) -> bool {
        self.building.is_empty()
    }

    /// Moves the building set into the committed slot and hands back a copy
    /// for publication. Nothing happens when no choice was added.
    pub fn commit(&mut self) -> Option<ChoiceSet> {
        if self.building.is_empty() {
            return None;
        }
        self.committed = std::mem::take(&mut self.building);
        Some(self.committed.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str) -> ChoiceGroup {
        Some(name.to_string())
    }

    #[test]
    fn set_choice_text_on_unknown_uid_leaves_set_untouched() {
        let mut registry = ChoiceRegistry::new();
        registry.add_choice("A", group("g1"));
        let before = registry.choices().clone();

        let err = registry
            .set_choice_text("missing", "en", "Nope")
            .expect_err("unknown uid must fail");
        assert_eq!(err.uid, "missing");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.choices(), &before);
    }

    #[test]
    fn later_default_overrides_earlier_one() {
        let mut registry = ChoiceRegistry::new();
        registry.set_selected("u", group("g"));
        registry.set_selected("v", group("g"));
        assert_eq!(registry.selected(&group("g")), Some("v"));
        assert!(!registry.is_selected("u", &group("g")));
    }

    #[test]
    fn re_adding_a_uid_replaces_its_group_and_texts() {
        let mut registry = ChoiceRegistry::new();
        registry.add_choice("u", group("g1"));
        registry.set_choice_text("u", "en", "First").unwrap();
        registry.add_choice("u", group("g2"));

        assert_eq!(registry.len(), 1);
        let choice = registry.choice("u").expect("entry kept");
        assert_eq!(choice.group, group("g2"));
        assert!(choice.per_language_text.is_empty());
    }

    #[test]
    fn ungrouped_selection_has_its_own_slot() {
        let mut registry = ChoiceRegistry::new();
        registry.set_selected("loose", None);
        registry.set_selected("tied", group("g"));
        assert_eq!(registry.selected(&None), Some("loose"));
        assert_eq!(registry.selected(&group("g")), Some("tied"));
    }

    #[test]
    fn text_lookup_is_exact_match() {
        let mut registry = ChoiceRegistry::new();
        registry.add_choice("A", None);
        registry.set_choice_text("A", "fr", "Oui").unwrap();
        assert_eq!(registry.text("A", "fr"), Some("Oui"));
        assert_eq!(registry.text("A", "en"), None);
        assert_eq!(
            registry.choice("A").and_then(|c| c.display_text("en")),
            Some("Oui")
        );
    }

    #[test]
    fn commit_replaces_previous_set_and_starts_fresh() {
        let mut registry = ChoiceRegistry::new();
        assert!(registry.commit().is_none());

        registry.add_choice("A", group("g"));
        registry.add_choice("B", group("g"));
        let published = registry.commit().expect("non-empty commit");
        assert_eq!(published.keys().collect::<Vec<_>>(), ["A", "B"]);
        assert!(registry.is_empty());

        registry.add_choice("C", None);
        registry.commit().expect("second commit");
        assert_eq!(registry.committed().keys().collect::<Vec<_>>(), ["C"]);
    }

    #[test]
    fn selection_survives_commit() {
        let mut registry = ChoiceRegistry::new();
        registry.add_choice("A", group("g"));
        registry.set_selected("A", group("g"));
        registry.commit();
        assert_eq!(registry.selected(&group("g")), Some("A"));
    }
}
