//! Reading the legacy flat XML schema into the document model.

use std::collections::HashMap;

use roxmltree::{Document, Node};
use tracing::debug;
use ywx_markup::BracketToXml;
use ywx_model::id::{
    CHAPTER_PREFIX, CHARACTER_PREFIX, CH_ROOT, CR_ROOT, ITEM_PREFIX, IT_ROOT, LC_ROOT,
    LOCATION_PREFIX, PLOT_LINE_PREFIX, PLOT_POINT_PREFIX, PL_ROOT, PN_ROOT, PRJ_NOTE_PREFIX,
    SECTION_PREFIX,
};
use ywx_model::text::{string_to_list, strip_illegal_characters};
use ywx_model::{
    Chapter, Character, ElementType, PlotLine, PlotPoint, ProjectNote, SceneKind, Section,
    WorldElement,
};

use crate::fields::{
    decode_chapter_type, decode_scene_type, ChapterField, CharacterField, ProjectField, SceneField,
    STAGE_MARKER,
};
use crate::{load_text, Yw7Error, Yw7File};

fn find<'a, 'i>(node: Node<'a, 'i>, tag: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn children<'a, 'i>(node: Node<'a, 'i>, tag: &'static str) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(move |n| n.has_tag_name(tag))
}

fn child_text<'a>(node: Node<'a, '_>, tag: &str) -> Option<&'a str> {
    find(node, tag).and_then(|n| n.text())
}

fn has_child(node: Node<'_, '_>, tag: &str) -> bool {
    find(node, tag).is_some()
}

/// Collects the recognized keyword variables of all `Fields` containers
/// under `node` into an enum-keyed table.
fn keyword_variables<'a, F: Copy>(
    node: Node<'a, '_>,
    all: &[F],
    tag_of: impl Fn(F) -> &'static str,
) -> HashMap<&'static str, &'a str>
where
    F: 'static,
{
    let mut table = HashMap::new();
    for fields in children(node, "Fields") {
        for &field in all {
            let tag = tag_of(field);
            if let Some(value) = child_text(fields, tag) {
                table.insert(tag, value);
            }
        }
    }
    table
}

impl Yw7File {
    /// Loads the whole project into `self.novel`. Fails up front when the
    /// advisory lock file exists.
    pub fn read(&mut self) -> Result<(), Yw7Error> {
        if self.is_locked() {
            return Err(Yw7Error::Locked(self.display_path()));
        }
        let text = load_text(&self.path)?;
        let text = strip_illegal_characters(&text);
        let doc = Document::parse(&text).map_err(|e| self.parse_error(e.to_string()))?;
        let root = doc.root_element();

        self.plot_point_scene_ids.clear();
        self.wc_log.clear();

        self.read_project(root);
        self.read_locations(root);
        self.read_items(root);
        self.read_characters(root);
        self.read_project_vars(root);
        self.read_chapters(root)?;
        self.read_scenes(root)?;
        self.read_project_notes(root);
        self.read_wc_log(root);

        self.novel.check_locale();
        debug!(
            chapters = self.novel.chapters.len(),
            sections = self.novel.sections.len(),
            plot_lines = self.novel.plot_lines.len(),
            "legacy project read"
        );
        Ok(())
    }

    fn parse_error(&self, message: String) -> Yw7Error {
        Yw7Error::Parse {
            path: self.display_path(),
            message,
        }
    }

    fn read_project(&mut self, root: Node<'_, '_>) {
        let Some(project) = find(root, "PROJECT") else {
            return;
        };
        let novel = &mut self.novel;
        if let Some(title) = child_text(project, "Title") {
            novel.set_title(Some(title.to_string()));
        }
        if let Some(author) = child_text(project, "AuthorName") {
            novel.set_author_name(Some(author.to_string()));
        }
        if let Some(desc) = child_text(project, "Desc") {
            novel.set_desc(Some(desc.to_string()));
        }
        if let Some(count) = child_text(project, "WordCountStart").and_then(|v| v.parse().ok()) {
            novel.set_word_count_start(Some(count));
        }
        if let Some(target) = child_text(project, "WordTarget").and_then(|v| v.parse().ok()) {
            novel.set_word_target(Some(target));
        }

        let kw = keyword_variables(project, &ProjectField::ALL, ProjectField::tag);
        let get = |field: ProjectField| kw.get(field.tag()).copied();
        let flag = |field: ProjectField| get(field) == Some("1");

        novel.set_work_phase(get(ProjectField::WorkPhase).and_then(|v| v.parse().ok()));
        novel.set_renumber_chapters(flag(ProjectField::RenumberChapters));
        novel.set_renumber_parts(flag(ProjectField::RenumberParts));
        novel.set_renumber_within_parts(flag(ProjectField::RenumberWithinParts));
        novel.set_roman_chapter_numbers(flag(ProjectField::RomanChapterNumbers));
        novel.set_roman_part_numbers(flag(ProjectField::RomanPartNumbers));
        novel.set_save_word_count(flag(ProjectField::SaveWordCount));
        let text_of = |field: ProjectField| get(field).map(str::to_string);
        novel.set_chapter_heading_prefix(text_of(ProjectField::ChapterHeadingPrefix));
        novel.set_chapter_heading_suffix(text_of(ProjectField::ChapterHeadingSuffix));
        novel.set_part_heading_prefix(text_of(ProjectField::PartHeadingPrefix));
        novel.set_part_heading_suffix(text_of(ProjectField::PartHeadingSuffix));
        novel.set_custom_goal(text_of(ProjectField::CustomGoal));
        novel.set_custom_conflict(text_of(ProjectField::CustomConflict));
        novel.set_custom_outcome(text_of(ProjectField::CustomOutcome));
        novel.set_custom_chr_bio(text_of(ProjectField::CustomChrBio));
        novel.set_custom_chr_goals(text_of(ProjectField::CustomChrGoals));
        novel.set_reference_date(text_of(ProjectField::ReferenceDate));
        if let Some(code) = get(ProjectField::LanguageCode) {
            novel.set_language_code(Some(code.to_string()));
        }
        if let Some(code) = get(ProjectField::CountryCode) {
            novel.set_country_code(Some(code.to_string()));
        }
    }

    fn read_locations(&mut self, root: Node<'_, '_>) {
        self.novel.tree.delete_children(LC_ROOT);
        let Some(container) = find(root, "LOCATIONS") else {
            return;
        };
        for xml_location in children(container, "LOCATION") {
            let Some(id) = child_text(xml_location, "ID") else {
                continue;
            };
            let lc_id = format!("{LOCATION_PREFIX}{id}");
            self.novel.tree.append(LC_ROOT, lc_id.clone());
            self.novel
                .locations
                .insert(lc_id, read_world_element(xml_location));
        }
    }

    fn read_items(&mut self, root: Node<'_, '_>) {
        self.novel.tree.delete_children(IT_ROOT);
        let Some(container) = find(root, "ITEMS") else {
            return;
        };
        for xml_item in children(container, "ITEM") {
            let Some(id) = child_text(xml_item, "ID") else {
                continue;
            };
            let it_id = format!("{ITEM_PREFIX}{id}");
            self.novel.tree.append(IT_ROOT, it_id.clone());
            self.novel.items.insert(it_id, read_world_element(xml_item));
        }
    }

    fn read_characters(&mut self, root: Node<'_, '_>) {
        self.novel.tree.delete_children(CR_ROOT);
        let Some(container) = find(root, "CHARACTERS") else {
            return;
        };
        for xml_character in children(container, "CHARACTER") {
            let Some(id) = child_text(xml_character, "ID") else {
                continue;
            };
            let cr_id = format!("{CHARACTER_PREFIX}{id}");
            let mut character = Character::default();
            if let Some(title) = child_text(xml_character, "Title") {
                character.set_title(Some(title.to_string()));
            }
            if let Some(desc) = child_text(xml_character, "Desc") {
                character.set_desc(Some(desc.to_string()));
            }
            if let Some(aka) = child_text(xml_character, "AKA") {
                character.set_aka(Some(aka.to_string()));
            }
            if let Some(tags) = child_text(xml_character, "Tags") {
                character.set_tags(string_to_list(tags));
            }
            if let Some(notes) = child_text(xml_character, "Notes") {
                character.set_notes(Some(notes.to_string()));
            }
            if let Some(bio) = child_text(xml_character, "Bio") {
                character.set_bio(Some(bio.to_string()));
            }
            if let Some(goals) = child_text(xml_character, "Goals") {
                character.set_goals(Some(goals.to_string()));
            }
            if let Some(full_name) = child_text(xml_character, "FullName") {
                character.set_full_name(Some(full_name.to_string()));
            }
            character.set_is_major(has_child(xml_character, "Major"));

            let kw = keyword_variables(xml_character, &CharacterField::ALL, CharacterField::tag);
            character.set_birth_date(
                kw.get(CharacterField::BirthDate.tag())
                    .map(|v| v.to_string()),
            );
            character.set_death_date(
                kw.get(CharacterField::DeathDate.tag())
                    .map(|v| v.to_string()),
            );

            self.novel.tree.append(CR_ROOT, cr_id.clone());
            self.novel.characters.insert(cr_id, character);
        }
    }

    /// Locale data lives in synthetic project variables: `Language`,
    /// `Country`, and a `lang=xx` marker per inline language actually used.
    fn read_project_vars(&mut self, root: Node<'_, '_>) {
        let Some(container) = find(root, "PROJECTVARS") else {
            return;
        };
        for xml_var in children(container, "PROJECTVAR") {
            let Some(title) = child_text(xml_var, "Title") else {
                continue;
            };
            if title == "Language" {
                if let Some(desc) = child_text(xml_var, "Desc") {
                    self.novel.set_language_code(Some(desc.to_string()));
                }
            } else if title == "Country" {
                if let Some(desc) = child_text(xml_var, "Desc") {
                    self.novel.set_country_code(Some(desc.to_string()));
                }
            } else if let Some(code) = title.strip_prefix("lang=") {
                let languages = self.novel.languages.get_or_insert_with(Vec::new);
                if !languages.iter().any(|l| l == code) {
                    languages.push(code.to_string());
                }
            }
        }
    }

    /// Chapters carrying an arc-definition keyword variable become plot
    /// lines; their scene references are remembered as plot-point scene
    /// IDs for the scene pass.
    fn read_chapters(&mut self, root: Node<'_, '_>) -> Result<(), Yw7Error> {
        self.novel.tree.delete_children(CH_ROOT);
        self.novel.tree.delete_children(PL_ROOT);
        let Some(container) = find(root, "CHAPTERS") else {
            return Ok(());
        };
        for xml_chapter in children(container, "CHAPTER") {
            let yw_id = child_text(xml_chapter, "ID")
                .ok_or_else(|| self.parse_error("chapter without ID".to_string()))?;

            let mut chapter = Chapter::default();
            if let Some(title) = child_text(xml_chapter, "Title") {
                chapter.set_title(Some(title.to_string()));
            }
            if let Some(desc) = child_text(xml_chapter, "Desc") {
                chapter.set_desc(Some(desc.to_string()));
            }
            chapter.set_level(if has_child(xml_chapter, "SectionStart") {
                1
            } else {
                2
            });
            chapter.set_chapter_type(decode_chapter_type(
                has_child(xml_chapter, "Unused"),
                child_text(xml_chapter, "ChapterType"),
                child_text(xml_chapter, "Type"),
            ));

            let kw = keyword_variables(xml_chapter, &ChapterField::ALL, ChapterField::tag);
            chapter.set_is_trash(kw.get(ChapterField::IsTrash.tag()).copied() == Some("1"));
            chapter.set_no_number(kw.get(ChapterField::NoNumber.tag()).copied() == Some("1"));
            let short_name = kw
                .get(ChapterField::ArcDefinitionLegacy.tag())
                .or_else(|| kw.get(ChapterField::ArcDefinition.tag()))
                .copied()
                .unwrap_or("");

            let scene_ids: Vec<&str> = find(xml_chapter, "Scenes")
                .map(|scenes| children(scenes, "ScID").filter_map(|n| n.text()).collect())
                .unwrap_or_default();

            if !short_name.is_empty() {
                let pl_id = format!("{PLOT_LINE_PREFIX}{yw_id}");
                let mut plot_line = PlotLine::default();
                plot_line.set_title(chapter.title().cloned());
                plot_line.set_desc(chapter.desc().cloned());
                plot_line.set_short_name(Some(short_name.to_string()));
                self.novel.tree.append(PL_ROOT, pl_id.clone());
                self.novel.plot_lines.insert(pl_id.clone(), plot_line);
                for scene_id in scene_ids {
                    self.novel
                        .tree
                        .append(&pl_id, format!("{PLOT_POINT_PREFIX}{scene_id}"));
                    self.plot_point_scene_ids.push(scene_id.to_string());
                }
            } else {
                let ch_id = format!("{CHAPTER_PREFIX}{yw_id}");
                self.novel.tree.append(CH_ROOT, ch_id.clone());
                self.novel.chapters.insert(ch_id.clone(), chapter);
                for scene_id in scene_ids {
                    self.novel
                        .tree
                        .append(&ch_id, format!("{SECTION_PREFIX}{scene_id}"));
                }
            }
        }
        Ok(())
    }

    fn read_scenes(&mut self, root: Node<'_, '_>) -> Result<(), Yw7Error> {
        let Some(container) = find(root, "SCENES") else {
            return Ok(());
        };
        let languages = self.novel.languages.clone().unwrap_or_default();
        let creator = self
            .novel
            .author_name()
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        let timestamp = chrono::Local::now()
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();
        let mut converter = BracketToXml::new(creator, timestamp, &languages);

        for xml_scene in children(container, "SCENE") {
            let yw_id = child_text(xml_scene, "ID")
                .ok_or_else(|| self.parse_error("scene without ID".to_string()))?;

            let mut section = Section::default();
            if let Some(title) = child_text(xml_scene, "Title") {
                section.set_title(Some(title.to_string()));
            }
            if let Some(desc) = child_text(xml_scene, "Desc") {
                section.set_desc(Some(desc.to_string()));
            }
            if let Some(content) = child_text(xml_scene, "SceneContent") {
                section.set_section_content(Some(converter.convert(content)));
            }

            let kw = keyword_variables(xml_scene, &SceneField::ALL, SceneField::tag);
            let type_code = kw.get(SceneField::SceneType.tag()).copied();
            // The sentinel is applied after the plot-line pass below: a
            // scene without an explicit type still belongs to its arcs
            // even when flagged unused.
            let field_type = decode_scene_type(false, type_code);

            let arc_names =
                string_to_list(kw.get(SceneField::SceneArcs.tag()).copied().unwrap_or(""));
            if field_type == ElementType::Normal {
                for short_name in &arc_names {
                    for plot_line in self.novel.plot_lines.values_mut() {
                        if plot_line.short_name().map(String::as_str) == Some(short_name.as_str())
                        {
                            let mut sections = plot_line.sections().clone();
                            sections.push(format!("{SECTION_PREFIX}{yw_id}"));
                            plot_line.set_sections(sections);
                            break;
                        }
                    }
                }
            }
            let assoc_ids =
                string_to_list(kw.get(SceneField::SceneAssoc.tag()).copied().unwrap_or(""));

            if let Some(goal) = child_text(xml_scene, "Goal") {
                section.set_goal(Some(goal.to_string()));
            }
            if let Some(conflict) = child_text(xml_scene, "Conflict") {
                section.set_conflict(Some(conflict.to_string()));
            }
            if let Some(outcome) = child_text(xml_scene, "Outcome") {
                section.set_outcome(Some(outcome.to_string()));
            }

            let scene_kind = if kw.contains_key(SceneField::CustomAr.tag()) {
                SceneKind::Custom
            } else if has_child(xml_scene, "ReactionScene") {
                SceneKind::Reaction
            } else if section.goal().is_some()
                || section.conflict().is_some()
                || section.outcome().is_some()
            {
                SceneKind::Action
            } else {
                SceneKind::None
            };
            section.set_scene(scene_kind);

            section.set_section_type(decode_scene_type(has_child(xml_scene, "Unused"), type_code));

            if let Some(status) = child_text(xml_scene, "Status").and_then(|v| v.parse().ok()) {
                section.set_status(status);
            }
            if let Some(notes) = child_text(xml_scene, "Notes") {
                section.set_notes(Some(notes.to_string()));
            }
            if let Some(tags) = child_text(xml_scene, "Tags") {
                section.set_tags(string_to_list(tags));
            }
            section.set_append_to_prev(has_child(xml_scene, "AppendToPrev"));

            self.read_scene_date_time(xml_scene, &mut section);

            if let Some(value) = child_text(xml_scene, "LastsDays") {
                section.set_lasts_days(Some(value.to_string()));
            }
            if let Some(value) = child_text(xml_scene, "LastsHours") {
                section.set_lasts_hours(Some(value.to_string()));
            }
            if let Some(value) = child_text(xml_scene, "LastsMinutes") {
                section.set_lasts_minutes(Some(value.to_string()));
            }

            section.set_characters(self.read_scene_refs(
                xml_scene,
                "Characters",
                "CharID",
                CHARACTER_PREFIX,
                CR_ROOT,
            ));
            section.set_locations(self.read_scene_refs(
                xml_scene,
                "Locations",
                "LocID",
                LOCATION_PREFIX,
                LC_ROOT,
            ));
            section.set_items(self.read_scene_refs(
                xml_scene,
                "Items",
                "ItemID",
                ITEM_PREFIX,
                IT_ROOT,
            ));

            if self.plot_point_scene_ids.iter().any(|id| id == yw_id) {
                let mut plot_point = PlotPoint::default();
                plot_point.set_title(section.title().cloned());
                plot_point.set_desc(section.desc().cloned());
                if let Some(first) = assoc_ids.first() {
                    plot_point.set_section_assoc(Some(format!("{SECTION_PREFIX}{first}")));
                }
                self.novel
                    .plot_points
                    .insert(format!("{PLOT_POINT_PREFIX}{yw_id}"), plot_point);
            } else {
                if section.tags().iter().any(|t| t == STAGE_MARKER) {
                    section.set_section_type(ElementType::Unused);
                    section.set_stage_level(Some(1));
                    let tags = section
                        .tags()
                        .iter()
                        .filter(|t| t.as_str() != STAGE_MARKER)
                        .cloned()
                        .collect();
                    section.set_tags(tags);
                }
                self.novel
                    .sections
                    .insert(format!("{SECTION_PREFIX}{yw_id}"), section);
            }
        }
        Ok(())
    }

    /// Either a combined date-time field or separate day/hour/minute
    /// fields; only the representation the source used survives.
    fn read_scene_date_time(&self, xml_scene: Node<'_, '_>, section: &mut Section) {
        if let Some(date_time) = child_text(xml_scene, "SpecificDateTime") {
            let parsed = chrono::NaiveDateTime::parse_from_str(date_time, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| {
                    chrono::NaiveDateTime::parse_from_str(date_time, "%Y-%m-%dT%H:%M:%S")
                });
            if let Ok(parsed) = parsed {
                section.set_date(Some(parsed.format("%Y-%m-%d").to_string()));
                section.set_time(Some(parsed.format("%H:%M:%S").to_string()));
            }
            return;
        }

        if let Some(day) = child_text(xml_scene, "Day") {
            if day.parse::<i64>().is_ok() {
                section.set_day(Some(day.to_string()));
            }
        }
        let hour = child_text(xml_scene, "Hour");
        let minute = child_text(xml_scene, "Minute");
        if hour.is_some() || minute.is_some() {
            section.set_time(Some(format!(
                "{:0>2}:{:0>2}:00",
                hour.unwrap_or("00"),
                minute.unwrap_or("00")
            )));
        }
    }

    fn read_scene_refs(
        &self,
        xml_scene: Node<'_, '_>,
        container_tag: &'static str,
        entry_tag: &'static str,
        prefix: &str,
        root_key: &str,
    ) -> Vec<String> {
        let Some(container) = find(xml_scene, container_tag) else {
            return Vec::new();
        };
        let known = self.novel.tree.get_children(root_key);
        children(container, entry_tag)
            .filter_map(|n| n.text())
            .map(|id| format!("{prefix}{id}"))
            .filter(|id| known.iter().any(|k| k == id))
            .collect()
    }

    fn read_project_notes(&mut self, root: Node<'_, '_>) {
        let Some(container) = find(root, "PROJECTNOTES") else {
            return;
        };
        for xml_note in children(container, "PROJECTNOTE") {
            let Some(id) = child_text(xml_note, "ID") else {
                continue;
            };
            let pn_id = format!("{PRJ_NOTE_PREFIX}{id}");
            let mut note = ProjectNote::default();
            if let Some(title) = child_text(xml_note, "Title") {
                note.set_title(Some(title.to_string()));
            }
            if let Some(desc) = child_text(xml_note, "Desc") {
                note.set_desc(Some(desc.to_string()));
            }
            self.novel.tree.append(PN_ROOT, pn_id.clone());
            self.novel.project_notes.insert(pn_id, note);
        }
    }

    fn read_wc_log(&mut self, root: Node<'_, '_>) {
        let Some(container) = find(root, "WCLog") else {
            return;
        };
        for xml_wc in children(container, "WC") {
            let (Some(date), Some(count), Some(total)) = (
                child_text(xml_wc, "Date"),
                child_text(xml_wc, "Count"),
                child_text(xml_wc, "TotalCount"),
            ) else {
                continue;
            };
            self.wc_log
                .insert(date.to_string(), (count.to_string(), total.to_string()));
        }
    }
}

fn read_world_element(node: Node<'_, '_>) -> WorldElement {
    let mut element = WorldElement::default();
    if let Some(title) = child_text(node, "Title") {
        element.set_title(Some(title.to_string()));
    }
    if let Some(desc) = child_text(node, "Desc") {
        element.set_desc(Some(desc.to_string()));
    }
    if let Some(aka) = child_text(node, "AKA") {
        element.set_aka(Some(aka.to_string()));
    }
    if let Some(tags) = child_text(node, "Tags") {
        element.set_tags(string_to_list(tags));
    }
    element
}
