//! Document model entities.
//!
//! Every mutable attribute sits behind a getter/setter pair; setters fire
//! the entity's change hook only when the stored value actually changes,
//! which is how the host application tracks dirty state without the model
//! knowing about it. Entities are created by the codecs during a read pass
//! (one per XML element) or by the host application.

use indexmap::IndexMap;

use crate::dates;
use crate::hook::{hooked_entity, hooked_field, ChangeHook};
use crate::text;

/// External link collection: path mapped to an optional resolved path.
pub type Links = IndexMap<String, Option<String>>;

// ============================================================================
// Shared enums
// ============================================================================

/// Chapter/section type. `Normal` exports; the other kinds do not.
///
/// The ordering is semantic: a higher value is at least as restrictive as a
/// lower one, which is what the chapter-type inheritance pass relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ElementType {
    #[default]
    Normal = 0,
    Notes = 1,
    Todo = 2,
    Unused = 3,
}

impl ElementType {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Canonical decode: 0..=3 map to their variants, anything else is
    /// coerced to `Notes` (the mildest non-exporting kind).
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Normal,
            1 => Self::Notes,
            2 => Self::Todo,
            3 => Self::Unused,
            _ => Self::Notes,
        }
    }
}

/// Narrative function of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SceneKind {
    #[default]
    None = 0,
    Action = 1,
    Reaction = 2,
    Custom = 3,
}

impl SceneKind {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Action,
            2 => Self::Reaction,
            3 => Self::Custom,
            _ => Self::None,
        }
    }
}

// ============================================================================
// Project note
// ============================================================================

/// Title/description-only element.
#[derive(Default)]
pub struct ProjectNote {
    on_change: Option<ChangeHook>,
    title: Option<String>,
    desc: Option<String>,
    links: Links,
}

hooked_entity!(ProjectNote);

impl ProjectNote {
    hooked_field!(opt title: String, title, set_title);
    hooked_field!(opt desc: String, desc, set_desc);
    hooked_field!(list links: Links, links, set_links);
}

// ============================================================================
// World elements
// ============================================================================

/// Location or item: a tagged, aliasable world-building element.
#[derive(Default)]
pub struct WorldElement {
    on_change: Option<ChangeHook>,
    title: Option<String>,
    desc: Option<String>,
    links: Links,
    notes: Option<String>,
    tags: Vec<String>,
    aka: Option<String>,
}

hooked_entity!(WorldElement);

impl WorldElement {
    hooked_field!(opt title: String, title, set_title);
    hooked_field!(opt desc: String, desc, set_desc);
    hooked_field!(list links: Links, links, set_links);
    hooked_field!(opt notes: String, notes, set_notes);
    hooked_field!(list tags: Vec<String>, tags, set_tags);
    hooked_field!(opt aka: String, aka, set_aka);
}

/// Character: a world element with biography, goals and lifecycle dates.
#[derive(Default)]
pub struct Character {
    on_change: Option<ChangeHook>,
    title: Option<String>,
    desc: Option<String>,
    links: Links,
    notes: Option<String>,
    tags: Vec<String>,
    aka: Option<String>,
    bio: Option<String>,
    goals: Option<String>,
    full_name: Option<String>,
    is_major: bool,
    birth_date: Option<String>,
    death_date: Option<String>,
}

hooked_entity!(Character);

impl Character {
    hooked_field!(opt title: String, title, set_title);
    hooked_field!(opt desc: String, desc, set_desc);
    hooked_field!(list links: Links, links, set_links);
    hooked_field!(opt notes: String, notes, set_notes);
    hooked_field!(list tags: Vec<String>, tags, set_tags);
    hooked_field!(opt aka: String, aka, set_aka);
    hooked_field!(opt bio: String, bio, set_bio);
    hooked_field!(opt goals: String, goals, set_goals);
    hooked_field!(opt full_name: String, full_name, set_full_name);
    hooked_field!(plain is_major: bool, is_major, set_is_major);
    hooked_field!(opt birth_date: String, birth_date, set_birth_date);
    hooked_field!(opt death_date: String, death_date, set_death_date);
}

// ============================================================================
// Chapter
// ============================================================================

pub struct Chapter {
    on_change: Option<ChangeHook>,
    title: Option<String>,
    desc: Option<String>,
    links: Links,
    notes: Option<String>,
    /// 1 = structural part, 2 = regular chapter.
    level: u8,
    chapter_type: ElementType,
    no_number: bool,
    is_trash: bool,
}

impl Default for Chapter {
    fn default() -> Self {
        Self {
            on_change: None,
            title: None,
            desc: None,
            links: Links::default(),
            notes: None,
            level: 2,
            chapter_type: ElementType::Normal,
            no_number: false,
            is_trash: false,
        }
    }
}

hooked_entity!(Chapter);

impl Chapter {
    hooked_field!(opt title: String, title, set_title);
    hooked_field!(opt desc: String, desc, set_desc);
    hooked_field!(list links: Links, links, set_links);
    hooked_field!(opt notes: String, notes, set_notes);
    hooked_field!(plain level: u8, level, set_level);
    hooked_field!(plain chapter_type: ElementType, chapter_type, set_chapter_type);
    hooked_field!(plain no_number: bool, no_number, set_no_number);
    hooked_field!(plain is_trash: bool, is_trash, set_is_trash);
}

// ============================================================================
// Plot line and plot point
// ============================================================================

pub struct PlotLine {
    on_change: Option<ChangeHook>,
    title: Option<String>,
    desc: Option<String>,
    links: Links,
    notes: Option<String>,
    /// Compact key also used as the legacy format's arc-definition value.
    short_name: Option<String>,
    sections: Vec<String>,
}

impl Default for PlotLine {
    fn default() -> Self {
        Self {
            on_change: None,
            title: None,
            desc: None,
            links: Links::default(),
            notes: None,
            short_name: None,
            sections: Vec::new(),
        }
    }
}

hooked_entity!(PlotLine);

impl PlotLine {
    hooked_field!(opt title: String, title, set_title);
    hooked_field!(opt desc: String, desc, set_desc);
    hooked_field!(list links: Links, links, set_links);
    hooked_field!(opt notes: String, notes, set_notes);
    hooked_field!(opt short_name: String, short_name, set_short_name);
    hooked_field!(list sections: Vec<String>, sections, set_sections);
}

#[derive(Default)]
pub struct PlotPoint {
    on_change: Option<ChangeHook>,
    title: Option<String>,
    desc: Option<String>,
    links: Links,
    notes: Option<String>,
    /// The one section this plot point is tied to, if any.
    section_assoc: Option<String>,
}

hooked_entity!(PlotPoint);

impl PlotPoint {
    hooked_field!(opt title: String, title, set_title);
    hooked_field!(opt desc: String, desc, set_desc);
    hooked_field!(list links: Links, links, set_links);
    hooked_field!(opt notes: String, notes, set_notes);
    hooked_field!(opt section_assoc: String, section_assoc, set_section_assoc);
}

// ============================================================================
// Section
// ============================================================================

pub struct Section {
    on_change: Option<ChangeHook>,
    title: Option<String>,
    desc: Option<String>,
    links: Links,
    notes: Option<String>,
    tags: Vec<String>,
    section_type: ElementType,
    /// Set on stage sections converted from stage-tagged legacy scenes.
    stage_level: Option<u8>,
    scene: SceneKind,
    /// 1 = Outline .. 5 = Done.
    status: i32,
    append_to_prev: bool,
    goal: Option<String>,
    conflict: Option<String>,
    outcome: Option<String>,
    plotline_notes: IndexMap<String, String>,
    date: Option<String>,
    weekday: Option<chrono::Weekday>,
    time: Option<String>,
    day: Option<String>,
    lasts_days: Option<String>,
    lasts_hours: Option<String>,
    lasts_minutes: Option<String>,
    characters: Vec<String>,
    locations: Vec<String>,
    items: Vec<String>,
    section_content: Option<String>,
    word_count: usize,
    /// Derived back-references, recomputed by [`Novel::update_plot_lines`];
    /// never persisted redundantly.
    pub sc_plot_lines: Vec<String>,
    /// Plot point ID mapped to its owning plot line ID.
    pub sc_plot_points: IndexMap<String, String>,
}

impl Default for Section {
    fn default() -> Self {
        Self {
            on_change: None,
            title: None,
            desc: None,
            links: Links::default(),
            notes: None,
            tags: Vec::new(),
            section_type: ElementType::Normal,
            stage_level: None,
            scene: SceneKind::None,
            status: 1,
            append_to_prev: false,
            goal: None,
            conflict: None,
            outcome: None,
            plotline_notes: IndexMap::new(),
            date: None,
            weekday: None,
            time: None,
            day: None,
            lasts_days: None,
            lasts_hours: None,
            lasts_minutes: None,
            characters: Vec::new(),
            locations: Vec::new(),
            items: Vec::new(),
            section_content: None,
            word_count: 0,
            sc_plot_lines: Vec::new(),
            sc_plot_points: IndexMap::new(),
        }
    }
}

hooked_entity!(Section);

impl Section {
    hooked_field!(opt title: String, title, set_title);
    hooked_field!(opt desc: String, desc, set_desc);
    hooked_field!(list links: Links, links, set_links);
    hooked_field!(opt notes: String, notes, set_notes);
    hooked_field!(list tags: Vec<String>, tags, set_tags);
    hooked_field!(plain section_type: ElementType, section_type, set_section_type);
    hooked_field!(opt stage_level: u8, stage_level, set_stage_level);
    hooked_field!(plain scene: SceneKind, scene, set_scene);
    hooked_field!(plain status: i32, status, set_status);
    hooked_field!(plain append_to_prev: bool, append_to_prev, set_append_to_prev);
    hooked_field!(opt goal: String, goal, set_goal);
    hooked_field!(opt conflict: String, conflict, set_conflict);
    hooked_field!(opt outcome: String, outcome, set_outcome);
    hooked_field!(list plotline_notes: IndexMap<String, String>, plotline_notes, set_plotline_notes);
    hooked_field!(opt time: String, time, set_time);
    hooked_field!(opt lasts_days: String, lasts_days, set_lasts_days);
    hooked_field!(opt lasts_hours: String, lasts_hours, set_lasts_hours);
    hooked_field!(opt lasts_minutes: String, lasts_minutes, set_lasts_minutes);
    hooked_field!(list characters: Vec<String>, characters, set_characters);
    hooked_field!(list locations: Vec<String>, locations, set_locations);
    hooked_field!(list items: Vec<String>, items, set_items);

    pub fn date(&self) -> Option<&String> {
        self.date.as_ref()
    }

    /// Sets the absolute date. A valid non-empty date clears `day`; `None`
    /// or an empty string only clears the date itself. Invalid dates are
    /// ignored.
    pub fn set_date(&mut self, value: Option<String>) {
        if self.date == value {
            return;
        }
        match value.filter(|date| !date.is_empty()) {
            None => {
                if self.date.is_none() {
                    return;
                }
                self.date = None;
                self.weekday = None;
                self.notify();
            }
            Some(new_date) => {
                let Ok(parsed) = chrono::NaiveDate::parse_from_str(&new_date, "%Y-%m-%d") else {
                    return;
                };
                self.weekday = Some(chrono::Datelike::weekday(&parsed));
                self.date = Some(new_date);
                self.day = None;
                self.notify();
            }
        }
    }

    pub fn weekday(&self) -> Option<chrono::Weekday> {
        self.weekday
    }

    pub fn day(&self) -> Option<&String> {
        self.day.as_ref()
    }

    /// Sets the relative day. A non-empty day clears `date`.
    pub fn set_day(&mut self, value: Option<String>) {
        if self.day == value {
            return;
        }
        self.day = value;
        if self.day.is_some() {
            self.date = None;
            self.weekday = None;
        }
        self.notify();
    }

    pub fn section_content(&self) -> Option<&String> {
        self.section_content.as_ref()
    }

    /// Stores the body text and recomputes the derived word count.
    pub fn set_section_content(&mut self, value: Option<String>) {
        if self.section_content == value {
            return;
        }
        self.word_count = value.as_deref().map(text::count_words).unwrap_or(0);
        self.section_content = value;
        self.notify();
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    /// Converts a relative day into an absolute date against the reference
    /// date. Returns whether the section ends up with a date.
    pub fn day_to_date(&mut self, reference_date: &str) -> bool {
        if self.date.is_some() {
            return true;
        }
        let Some(day) = self.day.clone() else {
            return false;
        };
        match dates::specific_date(&day, reference_date) {
            Ok(date) => {
                self.set_date(Some(date));
                true
            }
            Err(_) => {
                self.set_date(None);
                false
            }
        }
    }

    /// Converts an absolute date into a relative day against the reference
    /// date. Returns whether the section ends up with a day.
    pub fn date_to_day(&mut self, reference_date: &str) -> bool {
        if self.day.is_some() {
            return true;
        }
        let Some(date) = self.date.clone() else {
            return false;
        };
        match dates::unspecific_date(&date, reference_date) {
            Ok(day) => {
                self.set_day(Some(day));
                true
            }
            Err(_) => {
                self.day = None;
                false
            }
        }
    }

    /// End of the section's time span, derived from start and duration.
    pub fn end_date_time(&self) -> (Option<String>, Option<String>, Option<String>) {
        dates::end_date_time(
            self.date.as_deref(),
            self.day.as_deref(),
            self.time.as_deref(),
            self.lasts_days.as_deref(),
            self.lasts_hours.as_deref(),
            self.lasts_minutes.as_deref(),
        )
    }
}

mod novel;
pub use novel::Novel;

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn setter_fires_hook_only_on_change() {
        let fired = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&fired);
        let mut chapter = Chapter::default();
        chapter.set_change_hook(Rc::new(move || counter.set(counter.get() + 1)));

        chapter.set_title(Some("One".to_string()));
        chapter.set_title(Some("One".to_string()));
        chapter.set_title(Some("Two".to_string()));
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn date_and_day_are_mutually_exclusive() {
        let mut section = Section::default();
        section.set_day(Some("4".to_string()));
        section.set_date(Some("2024-07-13".to_string()));
        assert_eq!(section.date().map(String::as_str), Some("2024-07-13"));
        assert_eq!(section.day(), None);

        section.set_day(Some("2".to_string()));
        assert_eq!(section.day().map(String::as_str), Some("2"));
        assert_eq!(section.date(), None);
        assert_eq!(section.weekday(), None);
    }

    #[test]
    fn invalid_date_is_ignored() {
        let mut section = Section::default();
        section.set_day(Some("4".to_string()));
        section.set_date(Some("not-a-date".to_string()));
        assert_eq!(section.date(), None);
        assert_eq!(section.day().map(String::as_str), Some("4"));
    }

    #[test]
    fn word_count_tracks_content() {
        let mut section = Section::default();
        section.set_section_content(Some("<p>Three short words</p>".to_string()));
        assert_eq!(section.word_count(), 3);
        section.set_section_content(Some("<p>Three short words</p>".to_string()));
        assert_eq!(section.word_count(), 3);
        section.set_section_content(None);
        assert_eq!(section.word_count(), 0);
    }

    #[test]
    fn day_to_date_round_trip() {
        let mut section = Section::default();
        section.set_day(Some("3".to_string()));
        assert!(section.day_to_date("2024-07-13"));
        assert_eq!(section.date().map(String::as_str), Some("2024-07-16"));
        assert!(section.date_to_day("2024-07-13"));
        assert_eq!(section.day().map(String::as_str), Some("3"));
    }
}
