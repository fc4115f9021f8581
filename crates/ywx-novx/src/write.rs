//! Writing the document model to the structured schema.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::debug;
use ywx_model::id::{CH_ROOT, CR_ROOT, IT_ROOT, LC_ROOT, PL_ROOT, PN_ROOT};
use ywx_model::text::{list_to_string, strip_illegal_characters};
use ywx_model::{
    Chapter, Character, ElementType, Links, Novel, PlotLine, PlotPoint, ProjectNote, SceneKind,
    Section, WorldElement,
};

use crate::{write_with_backup, NovxError, NovxFile, MAJOR_VERSION, MINOR_VERSION};

type XmlWriter = Writer<Vec<u8>>;

fn serialize_error(e: impl std::fmt::Display) -> NovxError {
    NovxError::Serialize(e.to_string())
}

fn start(w: &mut XmlWriter, tag: &str) -> Result<(), NovxError> {
    w.write_event(Event::Start(BytesStart::new(tag)))
        .map_err(serialize_error)
}

fn start_with<'a>(
    w: &mut XmlWriter,
    tag: &str,
    attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<(), NovxError> {
    let mut element = BytesStart::new(tag);
    for (key, value) in attributes {
        element.push_attribute((key, value));
    }
    w.write_event(Event::Start(element)).map_err(serialize_error)
}

fn end(w: &mut XmlWriter, tag: &str) -> Result<(), NovxError> {
    w.write_event(Event::End(BytesEnd::new(tag)))
        .map_err(serialize_error)
}

fn leaf(w: &mut XmlWriter, tag: &str, text: &str) -> Result<(), NovxError> {
    start(w, tag)?;
    w.write_event(Event::Text(BytesText::new(text)))
        .map_err(serialize_error)?;
    end(w, tag)
}

fn leaf_if(w: &mut XmlWriter, tag: &str, text: Option<&String>) -> Result<(), NovxError> {
    if let Some(text) = text {
        if !text.is_empty() {
            leaf(w, tag, text)?;
        }
    }
    Ok(())
}

/// Multi-line text as a container of `<p>` paragraphs.
fn paragraphs(w: &mut XmlWriter, tag: &str, text: &str) -> Result<(), NovxError> {
    start(w, tag)?;
    for line in text.split('\n') {
        leaf(w, "p", line)?;
    }
    end(w, tag)
}

fn paragraphs_if(w: &mut XmlWriter, tag: &str, text: Option<&String>) -> Result<(), NovxError> {
    if let Some(text) = text {
        if !text.is_empty() {
            paragraphs(w, tag, text)?;
        }
    }
    Ok(())
}

fn write_links(w: &mut XmlWriter, links: &Links) -> Result<(), NovxError> {
    for (path, full_path) in links {
        start(w, "Link")?;
        leaf(w, "Path", path)?;
        if let Some(full_path) = full_path {
            if !full_path.is_empty() {
                leaf(w, "FullPath", full_path)?;
            }
        }
        end(w, "Link")?;
    }
    Ok(())
}

fn write_tags(w: &mut XmlWriter, tags: &[String]) -> Result<(), NovxError> {
    if !tags.is_empty() {
        leaf(w, "Tags", &list_to_string(tags))?;
    }
    Ok(())
}

/// Space-separated ID list as an `ids` attribute of an empty element.
fn write_id_list(w: &mut XmlWriter, tag: &str, ids: &[String]) -> Result<(), NovxError> {
    if ids.is_empty() {
        return Ok(());
    }
    let mut element = BytesStart::new(tag);
    element.push_attribute(("ids", ids.join(" ").as_str()));
    w.write_event(Event::Empty(element)).map_err(serialize_error)
}

// ============================================================================
// Entity writers
// ============================================================================

fn write_project(w: &mut XmlWriter, novel: &Novel) -> Result<(), NovxError> {
    let mut element = BytesStart::new("PROJECT");
    for (name, set) in [
        ("renumberChapters", novel.renumber_chapters()),
        ("renumberParts", novel.renumber_parts()),
        ("renumberWithinParts", novel.renumber_within_parts()),
        ("romanChapterNumbers", novel.roman_chapter_numbers()),
        ("romanPartNumbers", novel.roman_part_numbers()),
        ("saveWordCount", novel.save_word_count()),
    ] {
        if set {
            element.push_attribute((name, "1"));
        }
    }
    let work_phase = novel.work_phase().map(|phase| phase.to_string());
    if let Some(phase) = &work_phase {
        element.push_attribute(("workPhase", phase.as_str()));
    }
    w.write_event(Event::Start(element)).map_err(serialize_error)?;

    leaf_if(w, "Title", novel.title())?;
    paragraphs_if(w, "Desc", novel.desc())?;
    leaf_if(w, "Author", novel.author_name())?;
    leaf_if(w, "ChapterHeadingPrefix", novel.chapter_heading_prefix())?;
    leaf_if(w, "ChapterHeadingSuffix", novel.chapter_heading_suffix())?;
    leaf_if(w, "PartHeadingPrefix", novel.part_heading_prefix())?;
    leaf_if(w, "PartHeadingSuffix", novel.part_heading_suffix())?;
    leaf_if(w, "CustomPlotProgress", novel.custom_plot_progress())?;
    leaf_if(w, "CustomCharacterization", novel.custom_characterization())?;
    leaf_if(w, "CustomWorldBuilding", novel.custom_world_building())?;
    leaf_if(w, "CustomGoal", novel.custom_goal())?;
    leaf_if(w, "CustomConflict", novel.custom_conflict())?;
    leaf_if(w, "CustomOutcome", novel.custom_outcome())?;
    leaf_if(w, "CustomChrBio", novel.custom_chr_bio())?;
    leaf_if(w, "CustomChrGoals", novel.custom_chr_goals())?;
    if let Some(count) = novel.word_count_start() {
        leaf(w, "WordCountStart", &count.to_string())?;
    }
    if let Some(target) = novel.word_target() {
        leaf(w, "WordTarget", &target.to_string())?;
    }
    leaf_if(w, "ReferenceDate", novel.reference_date())?;

    end(w, "PROJECT")
}

fn chapter_attributes(chapter: &Chapter) -> Vec<(&'static str, String)> {
    let mut attributes = Vec::new();
    if chapter.chapter_type() != ElementType::Normal {
        attributes.push(("type", chapter.chapter_type().code().to_string()));
    }
    if chapter.level() == 1 {
        attributes.push(("level", "1".to_string()));
    }
    if chapter.is_trash() {
        attributes.push(("isTrash", "1".to_string()));
    }
    if chapter.no_number() {
        attributes.push(("noNumber", "1".to_string()));
    }
    attributes
}

fn write_chapter_body(w: &mut XmlWriter, chapter: &Chapter) -> Result<(), NovxError> {
    leaf_if(w, "Title", chapter.title())?;
    paragraphs_if(w, "Desc", chapter.desc())?;
    write_links(w, chapter.links())?;
    paragraphs_if(w, "Notes", chapter.notes())?;
    Ok(())
}

fn write_section(w: &mut XmlWriter, sc_id: &str, section: &Section) -> Result<(), NovxError> {
    let mut element = BytesStart::new("SECTION");
    element.push_attribute(("id", sc_id));
    if section.section_type() != ElementType::Normal {
        element.push_attribute(("type", section.section_type().code().to_string().as_str()));
    }
    if let Some(level) = section.stage_level() {
        element.push_attribute(("stageLevel", level.to_string().as_str()));
    }
    if section.status() > 1 {
        element.push_attribute(("status", section.status().to_string().as_str()));
    }
    if section.scene() != SceneKind::None {
        element.push_attribute(("scene", section.scene().code().to_string().as_str()));
    }
    if section.append_to_prev() {
        element.push_attribute(("append", "1"));
    }
    w.write_event(Event::Start(element)).map_err(serialize_error)?;

    leaf_if(w, "Title", section.title())?;
    paragraphs_if(w, "Desc", section.desc())?;
    write_links(w, section.links())?;
    paragraphs_if(w, "Notes", section.notes())?;
    write_tags(w, section.tags())?;
    paragraphs_if(w, "Goal", section.goal())?;
    paragraphs_if(w, "Conflict", section.conflict())?;
    paragraphs_if(w, "Outcome", section.outcome())?;

    for (pl_id, notes) in section.plotline_notes() {
        if notes.is_empty() || !section.sc_plot_lines.contains(pl_id) {
            continue;
        }
        let mut element = BytesStart::new("PlotlineNotes");
        element.push_attribute(("id", pl_id.as_str()));
        w.write_event(Event::Start(element)).map_err(serialize_error)?;
        for line in notes.split('\n') {
            leaf(w, "p", line)?;
        }
        end(w, "PlotlineNotes")?;
    }

    if let Some(date) = section.date() {
        leaf(w, "Date", date)?;
    } else if let Some(day) = section.day() {
        leaf(w, "Day", day)?;
    }
    leaf_if(w, "Time", section.time())?;

    for (tag, value) in [
        ("LastsDays", section.lasts_days()),
        ("LastsHours", section.lasts_hours()),
        ("LastsMinutes", section.lasts_minutes()),
    ] {
        if let Some(value) = value {
            if !value.is_empty() && value != "0" {
                leaf(w, tag, value)?;
            }
        }
    }

    write_id_list(w, "Characters", section.characters())?;
    write_id_list(w, "Locations", section.locations())?;
    write_id_list(w, "Items", section.items())?;

    if let Some(content) = section.section_content() {
        if !content.is_empty() && content != "<p></p>" && content != "<p />" {
            start(w, "Content")?;
            // Already inline XML; write through unescaped.
            w.write_event(Event::Text(BytesText::from_escaped(content.as_str())))
                .map_err(serialize_error)?;
            end(w, "Content")?;
        }
    }

    end(w, "SECTION")
}

fn write_character(w: &mut XmlWriter, cr_id: &str, character: &Character) -> Result<(), NovxError> {
    let mut element = BytesStart::new("CHARACTER");
    element.push_attribute(("id", cr_id));
    if character.is_major() {
        element.push_attribute(("major", "1"));
    }
    w.write_event(Event::Start(element)).map_err(serialize_error)?;

    leaf_if(w, "Title", character.title())?;
    paragraphs_if(w, "Desc", character.desc())?;
    write_links(w, character.links())?;
    paragraphs_if(w, "Notes", character.notes())?;
    write_tags(w, character.tags())?;
    leaf_if(w, "Aka", character.aka())?;
    leaf_if(w, "FullName", character.full_name())?;
    paragraphs_if(w, "Bio", character.bio())?;
    paragraphs_if(w, "Goals", character.goals())?;
    leaf_if(w, "BirthDate", character.birth_date())?;
    leaf_if(w, "DeathDate", character.death_date())?;

    end(w, "CHARACTER")
}

fn write_world_element(
    w: &mut XmlWriter,
    tag: &str,
    id: &str,
    element: &WorldElement,
) -> Result<(), NovxError> {
    start_with(w, tag, [("id", id)])?;
    leaf_if(w, "Title", element.title())?;
    paragraphs_if(w, "Desc", element.desc())?;
    write_links(w, element.links())?;
    paragraphs_if(w, "Notes", element.notes())?;
    write_tags(w, element.tags())?;
    leaf_if(w, "Aka", element.aka())?;
    end(w, tag)
}

fn write_plot_line(w: &mut XmlWriter, plot_line: &PlotLine) -> Result<(), NovxError> {
    leaf_if(w, "Title", plot_line.title())?;
    paragraphs_if(w, "Desc", plot_line.desc())?;
    write_links(w, plot_line.links())?;
    paragraphs_if(w, "Notes", plot_line.notes())?;
    leaf_if(w, "ShortName", plot_line.short_name())?;
    write_id_list(w, "Sections", plot_line.sections())
}

fn write_plot_point(w: &mut XmlWriter, pp_id: &str, plot_point: &PlotPoint) -> Result<(), NovxError> {
    start_with(w, "POINT", [("id", pp_id)])?;
    leaf_if(w, "Title", plot_point.title())?;
    paragraphs_if(w, "Desc", plot_point.desc())?;
    write_links(w, plot_point.links())?;
    paragraphs_if(w, "Notes", plot_point.notes())?;
    if let Some(sc_id) = plot_point.section_assoc() {
        let mut element = BytesStart::new("Section");
        element.push_attribute(("id", sc_id.as_str()));
        w.write_event(Event::Empty(element)).map_err(serialize_error)?;
    }
    end(w, "POINT")
}

fn write_project_note(w: &mut XmlWriter, pn_id: &str, note: &ProjectNote) -> Result<(), NovxError> {
    start_with(w, "PROJECTNOTE", [("id", pn_id)])?;
    leaf_if(w, "Title", note.title())?;
    paragraphs_if(w, "Desc", note.desc())?;
    write_links(w, note.links())?;
    end(w, "PROJECTNOTE")
}

// ============================================================================
// File-level write
// ============================================================================

impl NovxFile {
    /// Serializes `self.novel`, refreshing inherited section types, the
    /// harvested language list, and the word-count log first.
    pub fn write(&mut self) -> Result<(), NovxError> {
        self.update_word_count_log();
        self.novel.adjust_section_types();
        self.novel.get_languages();
        self.novel.check_locale();

        let xml = self.build_document()?;
        let header = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <!DOCTYPE novx SYSTEM \"novx_{MAJOR_VERSION}_{MINOR_VERSION}.dtd\">\n\
             <?xml-stylesheet href=\"novx.css\" type=\"text/css\"?>\n"
        );
        let text = strip_illegal_characters(&format!("{header}{xml}"));
        debug!(path = %self.display_path(), "writing novx project");
        write_with_backup(&self.path, &text)?;
        self.get_timestamp();
        Ok(())
    }

    fn build_document(&self) -> Result<String, NovxError> {
        let novel = &self.novel;
        let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);

        let version = format!("{MAJOR_VERSION}.{MINOR_VERSION}");
        let locale = format!(
            "{}-{}",
            novel.language_code().map(String::as_str).unwrap_or("zxx"),
            novel.country_code().map(String::as_str).unwrap_or("none"),
        );
        start_with(
            &mut w,
            "novx",
            [("version", version.as_str()), ("xml:lang", locale.as_str())],
        )?;

        write_project(&mut w, novel)?;

        start(&mut w, "CHAPTERS")?;
        for ch_id in novel.tree.get_children(CH_ROOT) {
            let Some(chapter) = novel.chapters.get(ch_id) else {
                continue;
            };
            let mut element = BytesStart::new("CHAPTER");
            element.push_attribute(("id", ch_id.as_str()));
            for (name, value) in chapter_attributes(chapter) {
                element.push_attribute((name, value.as_str()));
            }
            w.write_event(Event::Start(element)).map_err(serialize_error)?;
            write_chapter_body(&mut w, chapter)?;
            for sc_id in novel.tree.get_children(ch_id) {
                if let Some(section) = novel.sections.get(sc_id) {
                    write_section(&mut w, sc_id, section)?;
                }
            }
            end(&mut w, "CHAPTER")?;
        }
        end(&mut w, "CHAPTERS")?;

        start(&mut w, "CHARACTERS")?;
        for cr_id in novel.tree.get_children(CR_ROOT) {
            if let Some(character) = novel.characters.get(cr_id) {
                write_character(&mut w, cr_id, character)?;
            }
        }
        end(&mut w, "CHARACTERS")?;

        start(&mut w, "LOCATIONS")?;
        for lc_id in novel.tree.get_children(LC_ROOT) {
            if let Some(location) = novel.locations.get(lc_id) {
                write_world_element(&mut w, "LOCATION", lc_id, location)?;
            }
        }
        end(&mut w, "LOCATIONS")?;

        start(&mut w, "ITEMS")?;
        for it_id in novel.tree.get_children(IT_ROOT) {
            if let Some(item) = novel.items.get(it_id) {
                write_world_element(&mut w, "ITEM", it_id, item)?;
            }
        }
        end(&mut w, "ITEMS")?;

        start(&mut w, "ARCS")?;
        for pl_id in novel.tree.get_children(PL_ROOT) {
            let Some(plot_line) = novel.plot_lines.get(pl_id) else {
                continue;
            };
            start_with(&mut w, "ARC", [("id", pl_id.as_str())])?;
            write_plot_line(&mut w, plot_line)?;
            for pp_id in novel.tree.get_children(pl_id) {
                if let Some(plot_point) = novel.plot_points.get(pp_id) {
                    write_plot_point(&mut w, pp_id, plot_point)?;
                }
            }
            end(&mut w, "ARC")?;
        }
        end(&mut w, "ARCS")?;

        start(&mut w, "PROJECTNOTES")?;
        for pn_id in novel.tree.get_children(PN_ROOT) {
            if let Some(note) = novel.project_notes.get(pn_id) {
                write_project_note(&mut w, pn_id, note)?;
            }
        }
        end(&mut w, "PROJECTNOTES")?;

        self.write_progress(&mut w)?;

        end(&mut w, "novx")?;
        String::from_utf8(w.into_inner()).map_err(|e| NovxError::Serialize(e.to_string()))
    }

    fn write_progress(&self, w: &mut XmlWriter) -> Result<(), NovxError> {
        if self.wc_log.is_empty() {
            return Ok(());
        }
        start(w, "PROGRESS")?;
        let mut last: Option<(&String, &String)> = None;
        for (date, (count, total)) in &self.wc_log {
            if self.novel.save_word_count() {
                if last == Some((count, total)) {
                    continue;
                }
                last = Some((count, total));
            }
            start(w, "WC")?;
            leaf(w, "Date", date)?;
            leaf(w, "Count", count)?;
            leaf(w, "WithUnused", total)?;
            end(w, "WC")?;
        }
        end(w, "PROGRESS")
    }

    /// When the project tracks word counts, append today's freshly
    /// computed numbers and fold in any pending catch-up entries.
    pub(crate) fn update_word_count_log(&mut self) {
        if self.novel.save_word_count() {
            let (count, total) = self.novel.count_words();
            let today = chrono::Local::now().date_naive().to_string();
            self.wc_log_update
                .insert(today, (count.to_string(), total.to_string()));
            let updates: Vec<(String, (String, String))> = self.wc_log_update.drain(..).collect();
            for (date, entry) in updates {
                self.wc_log.insert(date, entry);
            }
        }
        self.wc_log_update.clear();
    }
}
