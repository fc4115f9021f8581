//! The root aggregate: project metadata plus every entity collection and
//! the project tree.

use std::sync::OnceLock;

use chrono::Datelike;
use indexmap::IndexMap;
use regex::Regex;

use crate::hook::{hooked_entity, hooked_field, ChangeHook};
use crate::id::CH_ROOT;
use crate::tree::ProjectTree;

use super::{Chapter, Character, ElementType, PlotLine, PlotPoint, ProjectNote, Section, WorldElement};

fn language_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<span xml:lang="(.*?)">"#).unwrap())
}

pub struct Novel {
    on_change: Option<ChangeHook>,
    title: Option<String>,
    desc: Option<String>,
    author_name: Option<String>,
    word_target: Option<i32>,
    word_count_start: Option<i32>,
    language_code: Option<String>,
    country_code: Option<String>,
    renumber_chapters: bool,
    renumber_parts: bool,
    renumber_within_parts: bool,
    roman_chapter_numbers: bool,
    roman_part_numbers: bool,
    save_word_count: bool,
    work_phase: Option<i32>,
    chapter_heading_prefix: Option<String>,
    chapter_heading_suffix: Option<String>,
    part_heading_prefix: Option<String>,
    part_heading_suffix: Option<String>,
    custom_plot_progress: Option<String>,
    custom_characterization: Option<String>,
    custom_world_building: Option<String>,
    custom_goal: Option<String>,
    custom_conflict: Option<String>,
    custom_outcome: Option<String>,
    custom_chr_bio: Option<String>,
    custom_chr_goals: Option<String>,
    reference_date: Option<String>,
    reference_weekday: Option<chrono::Weekday>,
    /// Language codes that actually occur in section bodies; `None` until
    /// harvested by [`Novel::get_languages`].
    pub languages: Option<Vec<String>>,

    pub chapters: IndexMap<String, Chapter>,
    pub sections: IndexMap<String, Section>,
    pub plot_lines: IndexMap<String, PlotLine>,
    pub plot_points: IndexMap<String, PlotPoint>,
    pub characters: IndexMap<String, Character>,
    pub locations: IndexMap<String, WorldElement>,
    pub items: IndexMap<String, WorldElement>,
    pub project_notes: IndexMap<String, ProjectNote>,
    pub tree: ProjectTree,
}

impl Default for Novel {
    fn default() -> Self {
        Self {
            on_change: None,
            title: None,
            desc: None,
            author_name: None,
            word_target: None,
            word_count_start: None,
            language_code: None,
            country_code: None,
            renumber_chapters: false,
            renumber_parts: false,
            renumber_within_parts: false,
            roman_chapter_numbers: false,
            roman_part_numbers: false,
            save_word_count: false,
            work_phase: None,
            chapter_heading_prefix: None,
            chapter_heading_suffix: None,
            part_heading_prefix: None,
            part_heading_suffix: None,
            custom_plot_progress: None,
            custom_characterization: None,
            custom_world_building: None,
            custom_goal: None,
            custom_conflict: None,
            custom_outcome: None,
            custom_chr_bio: None,
            custom_chr_goals: None,
            reference_date: None,
            reference_weekday: None,
            languages: None,
            chapters: IndexMap::new(),
            sections: IndexMap::new(),
            plot_lines: IndexMap::new(),
            plot_points: IndexMap::new(),
            characters: IndexMap::new(),
            locations: IndexMap::new(),
            items: IndexMap::new(),
            project_notes: IndexMap::new(),
            tree: ProjectTree::new(),
        }
    }
}

hooked_entity!(Novel);

impl Novel {
    hooked_field!(opt title: String, title, set_title);
    hooked_field!(opt desc: String, desc, set_desc);
    hooked_field!(opt author_name: String, author_name, set_author_name);
    hooked_field!(opt word_target: i32, word_target, set_word_target);
    hooked_field!(opt word_count_start: i32, word_count_start, set_word_count_start);
    hooked_field!(opt language_code: String, language_code, set_language_code);
    hooked_field!(opt country_code: String, country_code, set_country_code);
    hooked_field!(plain renumber_chapters: bool, renumber_chapters, set_renumber_chapters);
    hooked_field!(plain renumber_parts: bool, renumber_parts, set_renumber_parts);
    hooked_field!(plain renumber_within_parts: bool, renumber_within_parts, set_renumber_within_parts);
    hooked_field!(plain roman_chapter_numbers: bool, roman_chapter_numbers, set_roman_chapter_numbers);
    hooked_field!(plain roman_part_numbers: bool, roman_part_numbers, set_roman_part_numbers);
    hooked_field!(plain save_word_count: bool, save_word_count, set_save_word_count);
    hooked_field!(opt work_phase: i32, work_phase, set_work_phase);
    hooked_field!(opt chapter_heading_prefix: String, chapter_heading_prefix, set_chapter_heading_prefix);
    hooked_field!(opt chapter_heading_suffix: String, chapter_heading_suffix, set_chapter_heading_suffix);
    hooked_field!(opt part_heading_prefix: String, part_heading_prefix, set_part_heading_prefix);
    hooked_field!(opt part_heading_suffix: String, part_heading_suffix, set_part_heading_suffix);
    hooked_field!(opt custom_plot_progress: String, custom_plot_progress, set_custom_plot_progress);
    hooked_field!(opt custom_characterization: String, custom_characterization, set_custom_characterization);
    hooked_field!(opt custom_world_building: String, custom_world_building, set_custom_world_building);
    hooked_field!(opt custom_goal: String, custom_goal, set_custom_goal);
    hooked_field!(opt custom_conflict: String, custom_conflict, set_custom_conflict);
    hooked_field!(opt custom_outcome: String, custom_outcome, set_custom_outcome);
    hooked_field!(opt custom_chr_bio: String, custom_chr_bio, set_custom_chr_bio);
    hooked_field!(opt custom_chr_goals: String, custom_chr_goals, set_custom_chr_goals);

    pub fn reference_date(&self) -> Option<&String> {
        self.reference_date.as_ref()
    }

    pub fn reference_weekday(&self) -> Option<chrono::Weekday> {
        self.reference_weekday
    }

    /// Sets the reference date for relative-day arithmetic, caching its
    /// weekday. Invalid dates are ignored; `None` or an empty string
    /// clears both.
    pub fn set_reference_date(&mut self, value: Option<String>) {
        if self.reference_date == value {
            return;
        }
        match value.filter(|date| !date.is_empty()) {
            None => {
                if self.reference_date.is_none() {
                    return;
                }
                self.reference_date = None;
                self.reference_weekday = None;
                self.notify();
            }
            Some(new_date) => {
                let Ok(parsed) = chrono::NaiveDate::parse_from_str(&new_date, "%Y-%m-%d") else {
                    return;
                };
                self.reference_weekday = Some(parsed.weekday());
                self.reference_date = Some(new_date);
                self.notify();
            }
        }
    }

    /// Ensures the locale pair is usable: anything missing or malformed
    /// falls back to the undetermined-language codes `zxx`/`none`.
    pub fn check_locale(&mut self) {
        let language_ok = self
            .language_code
            .as_deref()
            .map(|code| code.len() == 2 && code != "None")
            .unwrap_or(false);
        let country_ok = self
            .country_code
            .as_deref()
            .map(|code| code.len() == 2)
            .unwrap_or(false);
        if language_ok && country_ok {
            return;
        }
        self.language_code = Some("zxx".to_string());
        self.country_code = Some("none".to_string());
        self.notify();
    }

    /// Harvests the language codes actually used by inline `<span>` markup
    /// across all section bodies, in order of first occurrence.
    pub fn get_languages(&mut self) {
        let mut languages: Vec<String> = Vec::new();
        for section in self.sections.values() {
            let Some(text) = section.section_content() else {
                continue;
            };
            for captures in language_tag().captures_iter(text) {
                let code = captures[1].to_string();
                if !languages.contains(&code) {
                    languages.push(code);
                }
            }
        }
        self.languages = Some(languages);
    }

    /// Recomputes every section's derived plot-line membership and
    /// plot-point mapping from the owning side of the associations.
    pub fn update_plot_lines(&mut self) {
        for section in self.sections.values_mut() {
            section.sc_plot_lines.clear();
            section.sc_plot_points.clear();
        }
        for (pl_id, plot_line) in &self.plot_lines {
            for sc_id in plot_line.sections() {
                let Some(section) = self.sections.get_mut(sc_id) else {
                    continue;
                };
                section.sc_plot_lines.push(pl_id.clone());
                for pp_id in self.tree.get_children(pl_id) {
                    let assoc = self
                        .plot_points
                        .get(pp_id)
                        .and_then(|pp| pp.section_assoc());
                    if assoc.map(String::as_str) == Some(sc_id.as_str()) {
                        section.sc_plot_points.insert(pp_id.clone(), pl_id.clone());
                        break;
                    }
                }
            }
        }
    }

    /// Propagates restrictive types down the chapter hierarchy: a part's
    /// non-normal type spreads to the chapters that follow it, and a
    /// chapter's type spreads to any contained section of a lower-ranked
    /// type.
    pub fn adjust_section_types(&mut self) {
        let mut part_type = ElementType::Normal;
        let chapter_ids: Vec<String> = self.tree.get_children(CH_ROOT).to_vec();
        for ch_id in &chapter_ids {
            let Some(chapter) = self.chapters.get_mut(ch_id) else {
                continue;
            };
            if chapter.level() == 1 {
                part_type = chapter.chapter_type();
            } else if part_type != ElementType::Normal && !chapter.is_trash() {
                chapter.set_chapter_type(part_type);
            }
            let chapter_type = chapter.chapter_type();
            let section_ids: Vec<String> = self.tree.get_children(ch_id).to_vec();
            for sc_id in &section_ids {
                if let Some(section) = self.sections.get_mut(sc_id) {
                    if section.section_type() < chapter_type {
                        section.set_section_type(chapter_type);
                    }
                }
            }
        }
    }

    /// Manuscript word counts: `(used, total)`. Trash chapters are skipped;
    /// the total additionally includes `Notes` sections, while `used` only
    /// counts `Normal` ones.
    pub fn count_words(&self) -> (usize, usize) {
        let mut count = 0;
        let mut total_count = 0;
        for ch_id in self.tree.get_children(CH_ROOT) {
            let Some(chapter) = self.chapters.get(ch_id) else {
                continue;
            };
            if chapter.is_trash() {
                continue;
            }
            for sc_id in self.tree.get_children(ch_id) {
                let Some(section) = self.sections.get(sc_id) else {
                    continue;
                };
                if section.section_type() < ElementType::Todo {
                    total_count += section.word_count();
                    if section.section_type() == ElementType::Normal {
                        count += section.word_count();
                    }
                }
            }
        }
        (count, total_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{CH_ROOT, PL_ROOT};

    fn section_with_words(words: &str) -> Section {
        let mut section = Section::default();
        section.set_section_content(Some(format!("<p>{words}</p>")));
        section
    }

    #[test]
    fn chapter_type_inheritance() {
        let mut novel = Novel::default();
        let mut chapter = Chapter::default();
        chapter.set_chapter_type(ElementType::Todo);
        novel.chapters.insert("ch1".to_string(), chapter);
        novel.tree.append(CH_ROOT, "ch1");
        for n in 1..=3 {
            let sc_id = format!("sc{n}");
            novel.sections.insert(sc_id.clone(), Section::default());
            novel.tree.append("ch1", sc_id);
        }

        novel.adjust_section_types();

        for n in 1..=3 {
            let section = &novel.sections[&format!("sc{n}")];
            assert_eq!(section.section_type(), ElementType::Todo);
        }
    }

    #[test]
    fn part_type_spreads_to_following_chapters() {
        let mut novel = Novel::default();
        let mut part = Chapter::default();
        part.set_level(1);
        part.set_chapter_type(ElementType::Notes);
        novel.chapters.insert("ch1".to_string(), part);
        novel.chapters.insert("ch2".to_string(), Chapter::default());
        novel.tree.append(CH_ROOT, "ch1");
        novel.tree.append(CH_ROOT, "ch2");

        novel.adjust_section_types();

        assert_eq!(novel.chapters["ch2"].chapter_type(), ElementType::Notes);
    }

    #[test]
    fn count_words_skips_trash_and_non_exporting() {
        let mut novel = Novel::default();
        novel.chapters.insert("ch1".to_string(), Chapter::default());
        novel.tree.append(CH_ROOT, "ch1");

        novel
            .sections
            .insert("sc1".to_string(), section_with_words("one two three"));
        let mut notes = section_with_words("four five");
        notes.set_section_type(ElementType::Notes);
        novel.sections.insert("sc2".to_string(), notes);
        let mut unused = section_with_words("six");
        unused.set_section_type(ElementType::Unused);
        novel.sections.insert("sc3".to_string(), unused);
        for sc_id in ["sc1", "sc2", "sc3"] {
            novel.tree.append("ch1", sc_id);
        }

        assert_eq!(novel.count_words(), (3, 5));
    }

    #[test]
    fn plot_point_association_symmetry() {
        let mut novel = Novel::default();
        novel.sections.insert("sc1".to_string(), Section::default());
        let mut plot_line = PlotLine::default();
        plot_line.set_sections(vec!["sc1".to_string()]);
        novel.plot_lines.insert("ac1".to_string(), plot_line);
        novel.tree.append(PL_ROOT, "ac1");
        let mut point = PlotPoint::default();
        point.set_section_assoc(Some("sc1".to_string()));
        novel.plot_points.insert("ap1".to_string(), point);
        novel.tree.append("ac1", "ap1");

        novel.update_plot_lines();

        let section = &novel.sections["sc1"];
        assert_eq!(section.sc_plot_lines, ["ac1"]);
        assert_eq!(section.sc_plot_points.get("ap1"), Some(&"ac1".to_string()));
    }

    #[test]
    fn check_locale_falls_back_to_undetermined() {
        let mut novel = Novel::default();
        novel.check_locale();
        assert_eq!(novel.language_code().map(String::as_str), Some("zxx"));
        assert_eq!(novel.country_code().map(String::as_str), Some("none"));

        let mut novel = Novel::default();
        novel.set_language_code(Some("de".to_string()));
        novel.set_country_code(Some("DE".to_string()));
        novel.check_locale();
        assert_eq!(novel.language_code().map(String::as_str), Some("de"));
    }

    #[test]
    fn get_languages_harvests_span_markup() {
        let mut novel = Novel::default();
        let mut section = Section::default();
        section.set_section_content(Some(
            r#"<p><span xml:lang="de">Hallo</span> and <span xml:lang="fr">salut</span></p>"#
                .to_string(),
        ));
        novel.sections.insert("sc1".to_string(), section);

        novel.get_languages();
        assert_eq!(novel.languages.as_deref().unwrap(), ["de", "fr"]);
    }
}
