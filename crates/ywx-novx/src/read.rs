//! Reading the structured schema into the document model.
//!
//! Any failure inside the entity passes is wrapped into a single "corrupt
//! project data" error carrying the underlying message; the version gate
//! and root-element check fire before that with their own errors.

use roxmltree::{Document, Node, ParsingOptions};
use tracing::debug;
use ywx_model::id::{
    check_id, CHAPTER_PREFIX, CHARACTER_PREFIX, CH_ROOT, CR_ROOT, ITEM_PREFIX, IT_ROOT, LC_ROOT,
    LOCATION_PREFIX, PLOT_LINE_PREFIX, PLOT_POINT_PREFIX, PL_ROOT, PN_ROOT, PRJ_NOTE_PREFIX,
    SECTION_PREFIX,
};
use ywx_model::text::{
    intersection, string_to_list, verified_date, verified_int_string, verified_time,
};
use ywx_model::{
    Chapter, Character, ElementType, Links, Novel, PlotLine, PlotPoint, ProjectNote, SceneKind,
    Section, WorldElement,
};

use crate::{NovxError, NovxFile, MAJOR_VERSION, MINOR_VERSION};

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

fn find<'a, 'i>(node: Node<'a, 'i>, tag: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn children<'a, 'i>(node: Node<'a, 'i>, tag: &'static str) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(move |n| n.has_tag_name(tag))
}

fn child_text<'a>(node: Node<'a, '_>, tag: &str) -> Option<&'a str> {
    find(node, tag).and_then(|n| n.text())
}

/// Joins the `<p>` paragraphs of a container element with newlines,
/// flattening nested inline markup to plain text.
fn paragraph_text(node: Node<'_, '_>) -> String {
    let mut lines = Vec::new();
    for paragraph in children(node, "p") {
        let mut line = String::new();
        for descendant in paragraph.descendants() {
            if descendant.is_text() {
                line.push_str(descendant.text().unwrap_or(""));
            }
        }
        lines.push(line);
    }
    lines.join("\n")
}

fn paragraph_field(node: Node<'_, '_>, tag: &str) -> Option<String> {
    find(node, tag).map(paragraph_text)
}

/// Space-separated ID list attribute of a named child element.
fn id_list(node: Node<'_, '_>, tag: &str) -> Vec<String> {
    find(node, tag)
        .and_then(|n| n.attribute("ids"))
        .map(|ids| {
            ids.split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
}

fn read_links(node: Node<'_, '_>) -> Links {
    let mut links = Links::default();
    for xml_link in children(node, "Link") {
        let (path, full_path) = match find(xml_link, "Path") {
            Some(path_node) => (
                path_node.text().map(str::to_string),
                child_text(xml_link, "FullPath").map(str::to_string),
            ),
            None => (
                xml_link.attribute("path").map(str::to_string),
                xml_link.attribute("fullPath").map(str::to_string),
            ),
        };
        if let Some(path) = path {
            if !path.is_empty() {
                links.insert(path, full_path);
            }
        }
    }
    links
}

/// `type` attribute: 0..=3 accepted, anything else present coerces to 1.
fn read_type_attribute(node: Node<'_, '_>) -> ElementType {
    match node.attribute("type") {
        None => ElementType::Normal,
        Some(value) => match value.parse::<i32>() {
            Ok(code @ 0..=3) => ElementType::from_code(code),
            _ => ElementType::Notes,
        },
    }
}

fn flag_attribute(node: Node<'_, '_>, name: &str) -> bool {
    node.attribute(name) == Some("1")
}

// ============================================================================
// Entity readers
// ============================================================================

fn read_chapter(node: Node<'_, '_>) -> Chapter {
    let mut chapter = Chapter::default();
    chapter.set_title(child_text(node, "Title").map(str::to_string));
    chapter.set_desc(paragraph_field(node, "Desc").filter(|d| !d.is_empty()));
    chapter.set_links(read_links(node));
    chapter.set_notes(paragraph_field(node, "Notes").filter(|n| !n.is_empty()));
    chapter.set_chapter_type(read_type_attribute(node));
    chapter.set_level(if node.attribute("level") == Some("1") {
        1
    } else {
        2
    });
    chapter.set_is_trash(flag_attribute(node, "isTrash"));
    chapter.set_no_number(flag_attribute(node, "noNumber"));
    chapter
}

fn read_section(node: Node<'_, '_>) -> Result<Section, NovxError> {
    let mut section = Section::default();
    section.set_title(child_text(node, "Title").map(str::to_string));
    section.set_desc(paragraph_field(node, "Desc").filter(|d| !d.is_empty()));
    section.set_links(read_links(node));
    section.set_notes(paragraph_field(node, "Notes").filter(|n| !n.is_empty()));
    if let Some(tags) = child_text(node, "Tags") {
        section.set_tags(string_to_list(tags));
    }

    section.set_section_type(read_type_attribute(node));
    if let Some(level) = node.attribute("stageLevel").and_then(|v| v.parse().ok()) {
        section.set_stage_level(Some(level));
    }
    // Canonical default: missing or unrecognized status is 1 (outline).
    let status = node
        .attribute("status")
        .and_then(|v| v.parse::<i32>().ok())
        .filter(|status| (1..=5).contains(status))
        .unwrap_or(1);
    section.set_status(status);
    let scene = match node.attribute("scene") {
        Some(value @ ("1" | "2" | "3")) => SceneKind::from_code(value.parse().unwrap_or(0)),
        _ => match node.attribute("pacing") {
            // Older minor versions stored action/reaction as 1/2 pacing.
            Some(value @ ("1" | "2")) => SceneKind::from_code(value.parse().unwrap_or(0) + 1),
            _ => SceneKind::None,
        },
    };
    section.set_scene(scene);
    section.set_append_to_prev(flag_attribute(node, "append"));

    section.set_goal(paragraph_field(node, "Goal").filter(|t| !t.is_empty()));
    section.set_conflict(paragraph_field(node, "Conflict").filter(|t| !t.is_empty()));
    section.set_outcome(paragraph_field(node, "Outcome").filter(|t| !t.is_empty()));

    let plot_notes_parent = find(node, "PlotNotes").unwrap_or(node);
    let mut plotline_notes = indexmap::IndexMap::new();
    for xml_note in children(plot_notes_parent, "PlotlineNotes") {
        if let Some(pl_id) = xml_note.attribute("id") {
            plotline_notes.insert(pl_id.to_string(), paragraph_text(xml_note));
        }
    }
    section.set_plotline_notes(plotline_notes);

    if let Some(date) = child_text(node, "Date") {
        section.set_date(Some(verified_date(date)?));
    } else if let Some(day) = child_text(node, "Day") {
        section.set_day(Some(verified_int_string(day)?));
    }
    if let Some(time) = child_text(node, "Time") {
        section.set_time(Some(verified_time(time)?));
    }
    if let Some(value) = child_text(node, "LastsDays") {
        section.set_lasts_days(Some(verified_int_string(value)?));
    }
    if let Some(value) = child_text(node, "LastsHours") {
        section.set_lasts_hours(Some(verified_int_string(value)?));
    }
    if let Some(value) = child_text(node, "LastsMinutes") {
        section.set_lasts_minutes(Some(verified_int_string(value)?));
    }

    section.set_characters(id_list(node, "Characters"));
    section.set_locations(id_list(node, "Locations"));
    section.set_items(id_list(node, "Items"));

    match find(node, "Content") {
        Some(content) => {
            let xml = inline_xml(content);
            if xml.is_empty() {
                section.set_section_content(Some("<p></p>".to_string()));
            } else {
                section.set_section_content(Some(xml));
            }
        }
        None => section.set_section_content(Some("<p></p>".to_string())),
    }

    Ok(section)
}

fn read_world_element(node: Node<'_, '_>) -> WorldElement {
    let mut element = WorldElement::default();
    element.set_title(child_text(node, "Title").map(str::to_string));
    element.set_desc(paragraph_field(node, "Desc").filter(|d| !d.is_empty()));
    element.set_links(read_links(node));
    element.set_notes(paragraph_field(node, "Notes").filter(|n| !n.is_empty()));
    if let Some(tags) = child_text(node, "Tags") {
        element.set_tags(string_to_list(tags));
    }
    element.set_aka(child_text(node, "Aka").map(str::to_string));
    element
}

fn read_character(node: Node<'_, '_>) -> Result<Character, NovxError> {
    let mut character = Character::default();
    character.set_title(child_text(node, "Title").map(str::to_string));
    character.set_desc(paragraph_field(node, "Desc").filter(|d| !d.is_empty()));
    character.set_links(read_links(node));
    character.set_notes(paragraph_field(node, "Notes").filter(|n| !n.is_empty()));
    if let Some(tags) = child_text(node, "Tags") {
        character.set_tags(string_to_list(tags));
    }
    character.set_aka(child_text(node, "Aka").map(str::to_string));
    character.set_is_major(flag_attribute(node, "major"));
    character.set_full_name(child_text(node, "FullName").map(str::to_string));
    character.set_bio(paragraph_field(node, "Bio").filter(|b| !b.is_empty()));
    character.set_goals(paragraph_field(node, "Goals").filter(|g| !g.is_empty()));
    if let Some(date) = child_text(node, "BirthDate") {
        character.set_birth_date(Some(verified_date(date)?));
    }
    if let Some(date) = child_text(node, "DeathDate") {
        character.set_death_date(Some(verified_date(date)?));
    }
    Ok(character)
}

fn read_plot_line(node: Node<'_, '_>) -> PlotLine {
    let mut plot_line = PlotLine::default();
    plot_line.set_title(child_text(node, "Title").map(str::to_string));
    plot_line.set_desc(paragraph_field(node, "Desc").filter(|d| !d.is_empty()));
    plot_line.set_links(read_links(node));
    plot_line.set_notes(paragraph_field(node, "Notes").filter(|n| !n.is_empty()));
    plot_line.set_short_name(child_text(node, "ShortName").map(str::to_string));
    plot_line.set_sections(id_list(node, "Sections"));
    plot_line
}

fn read_plot_point(node: Node<'_, '_>) -> PlotPoint {
    let mut plot_point = PlotPoint::default();
    plot_point.set_title(child_text(node, "Title").map(str::to_string));
    plot_point.set_desc(paragraph_field(node, "Desc").filter(|d| !d.is_empty()));
    plot_point.set_links(read_links(node));
    plot_point.set_notes(paragraph_field(node, "Notes").filter(|n| !n.is_empty()));
    plot_point.set_section_assoc(
        find(node, "Section")
            .and_then(|n| n.attribute("id"))
            .map(str::to_string),
    );
    plot_point
}

fn read_project(novel: &mut Novel, node: Node<'_, '_>) -> Result<(), NovxError> {
    novel.set_title(child_text(node, "Title").map(str::to_string));
    novel.set_desc(paragraph_field(node, "Desc").filter(|d| !d.is_empty()));
    novel.set_renumber_chapters(flag_attribute(node, "renumberChapters"));
    novel.set_renumber_parts(flag_attribute(node, "renumberParts"));
    novel.set_renumber_within_parts(flag_attribute(node, "renumberWithinParts"));
    novel.set_roman_chapter_numbers(flag_attribute(node, "romanChapterNumbers"));
    novel.set_roman_part_numbers(flag_attribute(node, "romanPartNumbers"));
    novel.set_save_word_count(flag_attribute(node, "saveWordCount"));
    novel.set_work_phase(
        node.attribute("workPhase")
            .and_then(|v| v.parse::<i32>().ok())
            .filter(|phase| (1..=5).contains(phase)),
    );
    novel.set_author_name(child_text(node, "Author").map(str::to_string));
    novel.set_chapter_heading_prefix(child_text(node, "ChapterHeadingPrefix").map(str::to_string));
    novel.set_chapter_heading_suffix(child_text(node, "ChapterHeadingSuffix").map(str::to_string));
    novel.set_part_heading_prefix(child_text(node, "PartHeadingPrefix").map(str::to_string));
    novel.set_part_heading_suffix(child_text(node, "PartHeadingSuffix").map(str::to_string));
    novel.set_custom_plot_progress(child_text(node, "CustomPlotProgress").map(str::to_string));
    novel
        .set_custom_characterization(child_text(node, "CustomCharacterization").map(str::to_string));
    novel.set_custom_world_building(child_text(node, "CustomWorldBuilding").map(str::to_string));
    novel.set_custom_goal(child_text(node, "CustomGoal").map(str::to_string));
    novel.set_custom_conflict(child_text(node, "CustomConflict").map(str::to_string));
    novel.set_custom_outcome(child_text(node, "CustomOutcome").map(str::to_string));
    novel.set_custom_chr_bio(child_text(node, "CustomChrBio").map(str::to_string));
    novel.set_custom_chr_goals(child_text(node, "CustomChrGoals").map(str::to_string));
    if let Some(count) = child_text(node, "WordCountStart").and_then(|v| v.parse().ok()) {
        novel.set_word_count_start(Some(count));
    }
    if let Some(target) = child_text(node, "WordTarget").and_then(|v| v.parse().ok()) {
        novel.set_word_target(Some(target));
    }
    if let Some(date) = child_text(node, "ReferenceDate") {
        novel.set_reference_date(Some(verified_date(date)?));
    }
    Ok(())
}

// ============================================================================
// Inline content serialization
// ============================================================================

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn serialize_inline(node: Node<'_, '_>, out: &mut String) {
    if node.is_text() {
        escape_text(node.text().unwrap_or(""), out);
        return;
    }
    if !node.is_element() {
        return;
    }
    out.push('<');
    out.push_str(node.tag_name().name());
    for attr in node.attributes() {
        let name = if attr.namespace() == Some(XML_NAMESPACE) {
            format!("xml:{}", attr.name())
        } else {
            attr.name().to_string()
        };
        out.push(' ');
        out.push_str(&name);
        out.push_str("=\"");
        escape_text(attr.value(), out);
        out.push('"');
    }
    out.push('>');
    for child in node.children() {
        serialize_inline(child, out);
    }
    out.push_str("</");
    out.push_str(node.tag_name().name());
    out.push('>');
}

/// Re-serializes the children of `<Content>` to the canonical single-line
/// inline XML string the model stores.
fn inline_xml(content: Node<'_, '_>) -> String {
    let mut out = String::new();
    for child in content.children() {
        serialize_inline(child, &mut out);
    }
    out.split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .concat()
}

// ============================================================================
// File-level read
// ============================================================================

impl NovxFile {
    /// Loads the whole project into `self.novel`.
    pub fn read(&mut self) -> Result<(), NovxError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| NovxError::Io {
            path: self.display_path(),
            source,
        })?;
        let opts = ParsingOptions {
            allow_dtd: true,
            ..Default::default()
        };
        let doc = Document::parse_with_options(&text, opts).map_err(|e| NovxError::Parse {
            path: self.display_path(),
            message: e.to_string(),
        })?;
        let root = doc.root_element();
        self.check_version(root)?;

        if let Some(locale) = root.attribute((XML_NAMESPACE, "lang")) {
            if let Some((language, country)) = locale.split_once('-') {
                self.novel.set_language_code(Some(language.to_string()));
                self.novel.set_country_code(Some(country.to_string()));
            }
        }

        self.novel.tree.reset();
        self.read_entities(root).map_err(|e| match e {
            NovxError::Corrupt(_) => e,
            other => NovxError::Corrupt(other.to_string()),
        })?;

        self.get_timestamp();
        self.keep_word_count();
        debug!(
            chapters = self.novel.chapters.len(),
            sections = self.novel.sections.len(),
            "novx project read"
        );
        Ok(())
    }

    /// Forward and backward incompatibility are both explicit: a newer
    /// major, older major, or newer minor version all refuse to load.
    fn check_version(&self, root: Node<'_, '_>) -> Result<(), NovxError> {
        if root.tag_name().name() != "novx" {
            return Err(NovxError::BadRoot(self.display_path()));
        }
        let version = root
            .attribute("version")
            .ok_or_else(|| NovxError::BadVersion(self.display_path()))?;
        let (major, minor) = version
            .split_once('.')
            .and_then(|(major, minor)| {
                Some((major.parse::<u32>().ok()?, minor.parse::<u32>().ok()?))
            })
            .ok_or_else(|| NovxError::BadVersion(self.display_path()))?;
        if major > MAJOR_VERSION {
            return Err(NovxError::CreatedWithNewer(self.display_path()));
        }
        if major < MAJOR_VERSION {
            return Err(NovxError::CreatedWithOlder(self.display_path()));
        }
        if minor > MINOR_VERSION {
            return Err(NovxError::CreatedWithNewer(self.display_path()));
        }
        Ok(())
    }

    fn read_entities(&mut self, root: Node<'_, '_>) -> Result<(), NovxError> {
        if let Some(project) = find(root, "PROJECT") {
            read_project(&mut self.novel, project)?;
        }

        if let Some(container) = find(root, "LOCATIONS") {
            for xml_location in children(container, "LOCATION") {
                let lc_id = required_id(xml_location)?;
                check_id(&lc_id, LOCATION_PREFIX)?;
                self.novel
                    .locations
                    .insert(lc_id.clone(), read_world_element(xml_location));
                self.novel.tree.append(LC_ROOT, lc_id);
            }
        }

        if let Some(container) = find(root, "ITEMS") {
            for xml_item in children(container, "ITEM") {
                let it_id = required_id(xml_item)?;
                check_id(&it_id, ITEM_PREFIX)?;
                self.novel
                    .items
                    .insert(it_id.clone(), read_world_element(xml_item));
                self.novel.tree.append(IT_ROOT, it_id);
            }
        }

        if let Some(container) = find(root, "CHARACTERS") {
            for xml_character in children(container, "CHARACTER") {
                let cr_id = required_id(xml_character)?;
                check_id(&cr_id, CHARACTER_PREFIX)?;
                self.novel
                    .characters
                    .insert(cr_id.clone(), read_character(xml_character)?);
                self.novel.tree.append(CR_ROOT, cr_id);
            }
        }

        if let Some(container) = find(root, "CHAPTERS") {
            for xml_chapter in children(container, "CHAPTER") {
                let ch_id = required_id(xml_chapter)?;
                check_id(&ch_id, CHAPTER_PREFIX)?;
                self.novel
                    .chapters
                    .insert(ch_id.clone(), read_chapter(xml_chapter));
                self.novel.tree.append(CH_ROOT, ch_id.clone());
                for xml_section in children(xml_chapter, "SECTION") {
                    let sc_id = required_id(xml_section)?;
                    check_id(&sc_id, SECTION_PREFIX)?;
                    let mut section = read_section(xml_section)?;
                    // Dangling references are dropped, not errors: the
                    // file may have been hand-edited.
                    let characters: Vec<String> =
                        self.novel.characters.keys().cloned().collect();
                    section.set_characters(intersection(section.characters(), &characters));
                    let locations: Vec<String> = self.novel.locations.keys().cloned().collect();
                    section.set_locations(intersection(section.locations(), &locations));
                    let items: Vec<String> = self.novel.items.keys().cloned().collect();
                    section.set_items(intersection(section.items(), &items));
                    self.novel.sections.insert(sc_id.clone(), section);
                    self.novel.tree.append(&ch_id, sc_id);
                }
            }
        }

        if let Some(container) = find(root, "ARCS") {
            for xml_plot_line in children(container, "ARC") {
                let pl_id = required_id(xml_plot_line)?;
                check_id(&pl_id, PLOT_LINE_PREFIX)?;
                let mut plot_line = read_plot_line(xml_plot_line);
                let sections: Vec<String> = self.novel.sections.keys().cloned().collect();
                plot_line.set_sections(intersection(plot_line.sections(), &sections));
                for sc_id in plot_line.sections() {
                    if let Some(section) = self.novel.sections.get_mut(sc_id) {
                        section.sc_plot_lines.push(pl_id.clone());
                    }
                }
                self.novel.plot_lines.insert(pl_id.clone(), plot_line);
                self.novel.tree.append(PL_ROOT, pl_id.clone());

                for xml_plot_point in children(xml_plot_line, "POINT") {
                    let pp_id = required_id(xml_plot_point)?;
                    check_id(&pp_id, PLOT_POINT_PREFIX)?;
                    let mut plot_point = read_plot_point(xml_plot_point);
                    match plot_point
                        .section_assoc()
                        .cloned()
                        .and_then(|sc_id| self.novel.sections.get_mut(&sc_id))
                    {
                        Some(section) => {
                            section.sc_plot_points.insert(pp_id.clone(), pl_id.clone());
                        }
                        None => plot_point.set_section_assoc(None),
                    }
                    self.novel.plot_points.insert(pp_id.clone(), plot_point);
                    self.novel.tree.append(&pl_id, pp_id);
                }
            }
        }

        if let Some(container) = find(root, "PROJECTNOTES") {
            for xml_note in children(container, "PROJECTNOTE") {
                let pn_id = required_id(xml_note)?;
                check_id(&pn_id, PRJ_NOTE_PREFIX)?;
                let mut note = ProjectNote::default();
                note.set_title(child_text(xml_note, "Title").map(str::to_string));
                note.set_desc(paragraph_field(xml_note, "Desc").filter(|d| !d.is_empty()));
                note.set_links(read_links(xml_note));
                self.novel.project_notes.insert(pn_id.clone(), note);
                self.novel.tree.append(PN_ROOT, pn_id);
            }
        }

        self.novel.adjust_section_types();

        if let Some(container) = find(root, "PROGRESS") {
            for xml_wc in children(container, "WC") {
                let (Some(date), Some(count), Some(total)) = (
                    child_text(xml_wc, "Date"),
                    child_text(xml_wc, "Count"),
                    child_text(xml_wc, "WithUnused"),
                ) else {
                    continue;
                };
                let date = verified_date(date)?;
                let count = verified_int_string(count)?;
                let total = verified_int_string(total)?;
                self.wc_log.insert(date, (count, total));
            }
        }

        Ok(())
    }

    /// When the stored log's latest entry disagrees with the freshly
    /// computed counts, queue a catch-up entry dated by the file's mtime.
    pub(crate) fn keep_word_count(&mut self) {
        if self.wc_log.is_empty() {
            return;
        }
        let (count, total) = self.novel.count_words();
        let (count, total) = (count.to_string(), total.to_string());
        let Some((_, (latest_count, latest_total))) = self.wc_log.last() else {
            return;
        };
        if *latest_count == count && *latest_total == total {
            return;
        }
        let file_date = self
            .timestamp
            .map(|ts| chrono::DateTime::<chrono::Local>::from(ts).date_naive())
            .unwrap_or_else(|| chrono::Local::now().date_naive())
            .to_string();
        self.wc_log_update.insert(file_date, (count, total));
    }
}

fn required_id(node: Node<'_, '_>) -> Result<String, NovxError> {
    node.attribute("id")
        .map(str::to_string)
        .ok_or_else(|| NovxError::Corrupt("element without id attribute".to_string()))
}
