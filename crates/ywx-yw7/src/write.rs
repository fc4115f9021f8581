//! Writing the document model back to the legacy flat XML schema.
//!
//! Plot lines have no first-class representation there: the writer
//! synthesizes a non-exportable "Plot lines" container chapter, one chapter
//! per plot line carrying an arc-definition keyword variable, and one scene
//! per plot point under a freshly allocated scene ID. Arc and association
//! keyword variables are always recomputed from the live associations,
//! never taken from stored values.

use std::collections::HashMap;

use indexmap::IndexMap;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::debug;
use ywx_markup::xml_to_bracket;
use ywx_model::id::{
    create_id, CHAPTER_PREFIX, CH_ROOT, CR_ROOT, IT_ROOT, LC_ROOT, PL_ROOT, PN_ROOT,
    SECTION_PREFIX,
};
use ywx_model::text::list_to_string;
use ywx_model::{ElementType, PlotPoint, SceneKind, Section};

use crate::fields::{
    encode_chapter_type, encode_scene_type, ChapterField, CharacterField, ProjectField,
    SceneField, CDATA_TAGS, STAGE_MARKER,
};
use crate::{write_with_backup, Yw7Error, Yw7File};

type XmlWriter = Writer<Vec<u8>>;

fn serialize_error(e: impl std::fmt::Display) -> Yw7Error {
    Yw7Error::Serialize(e.to_string())
}

fn start(w: &mut XmlWriter, tag: &str) -> Result<(), Yw7Error> {
    w.write_event(Event::Start(BytesStart::new(tag)))
        .map_err(serialize_error)
}

fn end(w: &mut XmlWriter, tag: &str) -> Result<(), Yw7Error> {
    w.write_event(Event::End(BytesEnd::new(tag)))
        .map_err(serialize_error)
}

fn leaf(w: &mut XmlWriter, tag: &str, text: &str) -> Result<(), Yw7Error> {
    start(w, tag)?;
    w.write_event(Event::Text(BytesText::new(text)))
        .map_err(serialize_error)?;
    end(w, tag)
}

fn leaf_if(w: &mut XmlWriter, tag: &str, text: Option<&String>) -> Result<(), Yw7Error> {
    if let Some(text) = text {
        if !text.is_empty() {
            leaf(w, tag, text)?;
        }
    }
    Ok(())
}

fn empty(w: &mut XmlWriter, tag: &str) -> Result<(), Yw7Error> {
    w.write_event(Event::Empty(BytesStart::new(tag)))
        .map_err(serialize_error)
}

/// Synthesized scene IDs and the recomputed arc/association tables,
/// prepared before any scene is serialized.
struct SceneCrossRefs {
    /// Plot point ID mapped to its synthesized scene ID.
    new_scene_ids: IndexMap<String, String>,
    /// Scene ID mapped to the short names of the plot lines it belongs to.
    arcs: HashMap<String, Vec<String>>,
    /// Scene ID mapped to associated scene numbers (without prefix).
    assoc: HashMap<String, Vec<String>>,
}

struct ChapterSpec<'a> {
    yw_id: String,
    title: Option<&'a String>,
    desc: Option<&'a String>,
    chapter_type: ElementType,
    part: bool,
    is_trash: bool,
    no_number: bool,
    arc_definition: Option<&'a String>,
    scene_numbers: Vec<String>,
}

impl Yw7File {
    /// Serializes `self.novel` to the legacy format, backing up any
    /// previous file first.
    pub fn write(&mut self) -> Result<(), Yw7Error> {
        if self.is_locked() {
            return Err(Yw7Error::Locked(self.display_path()));
        }
        if self.novel.languages.is_none() {
            self.novel.get_languages();
        }
        let wants_locale = self
            .novel
            .languages
            .as_ref()
            .map(|l| !l.is_empty())
            .unwrap_or(false)
            || self
                .novel
                .language_code()
                .map(|c| !c.is_empty())
                .unwrap_or(false)
            || self
                .novel
                .country_code()
                .map(|c| !c.is_empty())
                .unwrap_or(false);
        if wants_locale {
            self.novel.check_locale();
        }

        let xml = self.build_document(wants_locale)?;
        let text = postprocess(&xml);
        debug!(path = %self.display_path(), "writing legacy project");
        write_with_backup(&self.path, &text)
    }

    fn build_document(&self, write_locale_vars: bool) -> Result<String, Yw7Error> {
        let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
        start(&mut w, "YWRITER7")?;

        self.write_project(&mut w)?;

        start(&mut w, "LOCATIONS")?;
        for lc_id in self.novel.tree.get_children(LC_ROOT) {
            if let Some(location) = self.novel.locations.get(lc_id) {
                start(&mut w, "LOCATION")?;
                leaf(&mut w, "ID", &lc_id[2..])?;
                leaf_if(&mut w, "Title", location.title())?;
                leaf_if(&mut w, "Desc", location.desc())?;
                leaf_if(&mut w, "AKA", location.aka())?;
                write_tags(&mut w, location.tags())?;
                end(&mut w, "LOCATION")?;
            }
        }
        end(&mut w, "LOCATIONS")?;

        start(&mut w, "ITEMS")?;
        for it_id in self.novel.tree.get_children(IT_ROOT) {
            if let Some(item) = self.novel.items.get(it_id) {
                start(&mut w, "ITEM")?;
                leaf(&mut w, "ID", &it_id[2..])?;
                leaf_if(&mut w, "Title", item.title())?;
                leaf_if(&mut w, "Desc", item.desc())?;
                leaf_if(&mut w, "AKA", item.aka())?;
                write_tags(&mut w, item.tags())?;
                end(&mut w, "ITEM")?;
            }
        }
        end(&mut w, "ITEMS")?;

        start(&mut w, "CHARACTERS")?;
        for cr_id in self.novel.tree.get_children(CR_ROOT) {
            if let Some(character) = self.novel.characters.get(cr_id) {
                self.write_character(&mut w, &cr_id[2..], character)?;
            }
        }
        end(&mut w, "CHARACTERS")?;

        self.write_project_vars(&mut w, write_locale_vars)?;

        let refs = self.compute_cross_refs();

        start(&mut w, "SCENES")?;
        for (sc_id, section) in &self.novel.sections {
            self.write_scene(&mut w, sc_id, section, &refs)?;
        }
        for (pp_id, plot_point) in &self.novel.plot_points {
            let Some(sc_id) = refs.new_scene_ids.get(pp_id) else {
                continue;
            };
            self.write_plot_point_scene(&mut w, sc_id, plot_point, &refs)?;
        }
        end(&mut w, "SCENES")?;

        self.write_chapters(&mut w, &refs)?;

        if !self.novel.tree.get_children(PN_ROOT).is_empty() {
            start(&mut w, "PROJECTNOTES")?;
            for pn_id in self.novel.tree.get_children(PN_ROOT) {
                if let Some(note) = self.novel.project_notes.get(pn_id) {
                    start(&mut w, "PROJECTNOTE")?;
                    leaf(&mut w, "ID", &pn_id[2..])?;
                    leaf_if(&mut w, "Title", note.title())?;
                    leaf_if(&mut w, "Desc", note.desc())?;
                    end(&mut w, "PROJECTNOTE")?;
                }
            }
            end(&mut w, "PROJECTNOTES")?;
        }

        self.write_wc_log(&mut w)?;

        end(&mut w, "YWRITER7")?;
        String::from_utf8(w.into_inner()).map_err(|e| Yw7Error::Serialize(e.to_string()))
    }

    fn write_project(&self, w: &mut XmlWriter) -> Result<(), Yw7Error> {
        let novel = &self.novel;
        start(w, "PROJECT")?;
        leaf(w, "Ver", "7")?;
        leaf_if(w, "Title", novel.title())?;
        leaf_if(w, "Desc", novel.desc())?;
        leaf_if(w, "AuthorName", novel.author_name())?;
        if let Some(count) = novel.word_count_start() {
            leaf(w, "WordCountStart", &count.to_string())?;
        }
        if let Some(target) = novel.word_target() {
            leaf(w, "WordTarget", &target.to_string())?;
        }

        start(w, "Fields")?;
        if let Some(phase) = novel.work_phase() {
            leaf(w, ProjectField::WorkPhase.tag(), &phase.to_string())?;
        }
        for (field, set) in [
            (ProjectField::RenumberChapters, novel.renumber_chapters()),
            (ProjectField::RenumberParts, novel.renumber_parts()),
            (
                ProjectField::RenumberWithinParts,
                novel.renumber_within_parts(),
            ),
            (
                ProjectField::RomanChapterNumbers,
                novel.roman_chapter_numbers(),
            ),
            (ProjectField::RomanPartNumbers, novel.roman_part_numbers()),
            (ProjectField::SaveWordCount, novel.save_word_count()),
        ] {
            if set {
                leaf(w, field.tag(), "1")?;
            }
        }
        for (field, value) in [
            (
                ProjectField::ChapterHeadingPrefix,
                novel.chapter_heading_prefix(),
            ),
            (
                ProjectField::ChapterHeadingSuffix,
                novel.chapter_heading_suffix(),
            ),
            (ProjectField::PartHeadingPrefix, novel.part_heading_prefix()),
            (ProjectField::PartHeadingSuffix, novel.part_heading_suffix()),
            (ProjectField::CustomGoal, novel.custom_goal()),
            (ProjectField::CustomConflict, novel.custom_conflict()),
            (ProjectField::CustomOutcome, novel.custom_outcome()),
            (ProjectField::CustomChrBio, novel.custom_chr_bio()),
            (ProjectField::CustomChrGoals, novel.custom_chr_goals()),
            (ProjectField::ReferenceDate, novel.reference_date()),
        ] {
            leaf_if(w, field.tag(), value)?;
        }
        end(w, "Fields")?;
        end(w, "PROJECT")
    }

    fn write_character(
        &self,
        w: &mut XmlWriter,
        yw_id: &str,
        character: &ywx_model::Character,
    ) -> Result<(), Yw7Error> {
        start(w, "CHARACTER")?;
        leaf(w, "ID", yw_id)?;
        leaf_if(w, "Title", character.title())?;
        leaf_if(w, "Desc", character.desc())?;
        leaf_if(w, "Notes", character.notes())?;
        leaf_if(w, "AKA", character.aka())?;
        write_tags(w, character.tags())?;
        leaf_if(w, "Bio", character.bio())?;
        leaf_if(w, "Goals", character.goals())?;
        leaf_if(w, "FullName", character.full_name())?;
        if character.is_major() {
            leaf(w, "Major", "-1")?;
        }
        let birth = character.birth_date().filter(|d| !d.is_empty());
        let death = character.death_date().filter(|d| !d.is_empty());
        if birth.is_some() || death.is_some() {
            start(w, "Fields")?;
            leaf_if(w, CharacterField::BirthDate.tag(), birth)?;
            leaf_if(w, CharacterField::DeathDate.tag(), death)?;
            end(w, "Fields")?;
        }
        end(w, "CHARACTER")
    }

    /// Language/country codes and per-language inline-span markers are
    /// persisted as synthetic project variables.
    fn write_project_vars(&self, w: &mut XmlWriter, wanted: bool) -> Result<(), Yw7Error> {
        start(w, "PROJECTVARS")?;
        if wanted {
            let mut var_ids: Vec<String> = Vec::new();
            let add = |w: &mut XmlWriter,
                           var_ids: &mut Vec<String>,
                           title: &str,
                           desc: &str|
             -> Result<(), Yw7Error> {
                let id = create_id(var_ids, "");
                var_ids.push(id.clone());
                start(w, "PROJECTVAR")?;
                leaf(w, "ID", &id)?;
                leaf(w, "Title", title)?;
                leaf(w, "Desc", desc)?;
                leaf(w, "Tags", "0")?;
                end(w, "PROJECTVAR")
            };

            add(
                w,
                &mut var_ids,
                "Language",
                self.novel.language_code().map(String::as_str).unwrap_or(""),
            )?;
            add(
                w,
                &mut var_ids,
                "Country",
                self.novel.country_code().map(String::as_str).unwrap_or(""),
            )?;
            if let Some(languages) = &self.novel.languages {
                for code in languages {
                    add(
                        w,
                        &mut var_ids,
                        &format!("lang={code}"),
                        &format!("<HTM <SPAN LANG=\"{code}\"> /HTM>"),
                    )?;
                    add(w, &mut var_ids, &format!("/lang={code}"), "<HTM </SPAN> /HTM>")?;
                }
            }
        }
        end(w, "PROJECTVARS")
    }

    fn compute_cross_refs(&self) -> SceneCrossRefs {
        let mut scene_ids: Vec<String> = self.novel.sections.keys().cloned().collect();
        let mut new_scene_ids = IndexMap::new();
        for pp_id in self.novel.plot_points.keys() {
            let sc_id = create_id(&scene_ids, SECTION_PREFIX);
            scene_ids.push(sc_id.clone());
            new_scene_ids.insert(pp_id.clone(), sc_id);
        }

        let mut arcs: HashMap<String, Vec<String>> = HashMap::new();
        for (pl_id, plot_line) in &self.novel.plot_lines {
            let Some(short_name) = plot_line.short_name() else {
                continue;
            };
            for sc_id in plot_line.sections() {
                arcs.entry(sc_id.clone()).or_default().push(short_name.clone());
            }
            for pp_id in self.novel.tree.get_children(pl_id) {
                if let Some(sc_id) = new_scene_ids.get(pp_id) {
                    arcs.entry(sc_id.clone()).or_default().push(short_name.clone());
                }
            }
        }

        let mut assoc: HashMap<String, Vec<String>> = HashMap::new();
        for (pp_id, plot_point) in &self.novel.plot_points {
            let (Some(section_id), Some(new_id)) =
                (plot_point.section_assoc(), new_scene_ids.get(pp_id))
            else {
                continue;
            };
            assoc
                .entry(section_id.clone())
                .or_default()
                .push(new_id[2..].to_string());
            assoc
                .entry(new_id.clone())
                .or_default()
                .push(section_id[2..].to_string());
        }

        SceneCrossRefs {
            new_scene_ids,
            arcs,
            assoc,
        }
    }

    fn write_scene_fields(
        &self,
        w: &mut XmlWriter,
        sc_id: &str,
        scene_type: Option<&str>,
        refs: &SceneCrossRefs,
    ) -> Result<(), Yw7Error> {
        start(w, "Fields")?;
        if let Some(code) = scene_type {
            leaf(w, SceneField::SceneType.tag(), code)?;
        }
        if let Some(arcs) = refs.arcs.get(sc_id) {
            if !arcs.is_empty() {
                leaf(w, SceneField::SceneArcs.tag(), &list_to_string(arcs))?;
            }
        }
        if let Some(assoc) = refs.assoc.get(sc_id) {
            if !assoc.is_empty() {
                leaf(w, SceneField::SceneAssoc.tag(), &list_to_string(assoc))?;
            }
        }
        end(w, "Fields")
    }

    fn write_scene(
        &self,
        w: &mut XmlWriter,
        sc_id: &str,
        section: &Section,
        refs: &SceneCrossRefs,
    ) -> Result<(), Yw7Error> {
        let (unused, type_code) = encode_scene_type(section.section_type());

        start(w, "SCENE")?;
        leaf(w, "ID", &sc_id[2..])?;
        leaf_if(w, "Title", section.title())?;
        self.write_scene_fields(w, sc_id, type_code, refs)?;
        leaf_if(w, "Desc", section.desc())?;
        if unused {
            leaf(w, "Unused", "-1")?;
        }
        leaf(w, "Status", &section.status().to_string())?;

        let content = section
            .section_content()
            .map(|xml| xml_to_bracket(xml))
            .transpose()?
            .unwrap_or_default();
        if content.is_empty() {
            empty(w, "SceneContent")?;
        } else {
            leaf(w, "SceneContent", &content)?;
        }

        leaf_if(w, "Notes", section.notes())?;

        let mut tags = section.tags().clone();
        if section.stage_level().is_some() && !tags.iter().any(|t| t == STAGE_MARKER) {
            tags.push(STAGE_MARKER.to_string());
        }
        write_tags(w, &tags)?;

        if section.append_to_prev() {
            leaf(w, "AppendToPrev", "-1")?;
        }

        match (section.date(), section.time()) {
            (Some(date), Some(time)) => {
                leaf(w, "SpecificDateTime", &format!("{date} {time}"))?;
                leaf(w, "SpecificDateMode", "-1")?;
            }
            (_, time) => {
                if let Some(day) = section.day() {
                    leaf(w, "Day", day)?;
                }
                if let Some(time) = time {
                    let mut parts = time.split(':');
                    if let (Some(hours), Some(minutes)) = (parts.next(), parts.next()) {
                        leaf(w, "Hour", hours)?;
                        leaf(w, "Minute", minutes)?;
                    }
                }
            }
        }

        leaf_if(w, "LastsDays", section.lasts_days())?;
        leaf_if(w, "LastsHours", section.lasts_hours())?;
        leaf_if(w, "LastsMinutes", section.lasts_minutes())?;

        if section.scene() == SceneKind::Reaction {
            leaf(w, "ReactionScene", "-1")?;
        }
        leaf_if(w, "Goal", section.goal())?;
        leaf_if(w, "Conflict", section.conflict())?;
        leaf_if(w, "Outcome", section.outcome())?;

        write_id_refs(w, "Characters", "CharID", section.characters())?;
        write_id_refs(w, "Locations", "LocID", section.locations())?;
        write_id_refs(w, "Items", "ItemID", section.items())?;

        end(w, "SCENE")
    }

    fn write_plot_point_scene(
        &self,
        w: &mut XmlWriter,
        sc_id: &str,
        plot_point: &PlotPoint,
        refs: &SceneCrossRefs,
    ) -> Result<(), Yw7Error> {
        start(w, "SCENE")?;
        leaf(w, "ID", &sc_id[2..])?;
        leaf_if(w, "Title", plot_point.title())?;
        self.write_scene_fields(w, sc_id, Some("2"), refs)?;
        leaf_if(w, "Desc", plot_point.desc())?;
        leaf(w, "Unused", "-1")?;
        leaf(w, "Status", "1")?;
        empty(w, "SceneContent")?;
        end(w, "SCENE")
    }

    fn write_chapters(&self, w: &mut XmlWriter, refs: &SceneCrossRefs) -> Result<(), Yw7Error> {
        start(w, "CHAPTERS")?;

        let mut chapter_ids: Vec<String> = self.novel.tree.get_children(CH_ROOT).to_vec();
        for ch_id in self.novel.tree.get_children(CH_ROOT) {
            let Some(chapter) = self.novel.chapters.get(ch_id) else {
                continue;
            };
            let scene_numbers = self
                .novel
                .tree
                .get_children(ch_id)
                .iter()
                .map(|sc_id| sc_id[2..].to_string())
                .collect();
            self.write_chapter(
                w,
                ChapterSpec {
                    yw_id: ch_id[2..].to_string(),
                    title: chapter.title(),
                    desc: chapter.desc(),
                    chapter_type: chapter.chapter_type(),
                    part: chapter.level() == 1,
                    is_trash: chapter.is_trash(),
                    no_number: chapter.no_number(),
                    arc_definition: None,
                    scene_numbers,
                },
            )?;
        }

        if !self.novel.plot_lines.is_empty() {
            // Non-exportable container part holding the plot-line chapters.
            let container_id = create_id(&chapter_ids, CHAPTER_PREFIX);
            chapter_ids.push(container_id.clone());
            let container_title = "Plot lines".to_string();
            self.write_chapter(
                w,
                ChapterSpec {
                    yw_id: container_id[2..].to_string(),
                    title: Some(&container_title),
                    desc: None,
                    chapter_type: ElementType::Todo,
                    part: true,
                    is_trash: false,
                    no_number: false,
                    arc_definition: None,
                    scene_numbers: Vec::new(),
                },
            )?;

            for pl_id in self.novel.tree.get_children(PL_ROOT) {
                let Some(plot_line) = self.novel.plot_lines.get(pl_id) else {
                    continue;
                };
                let chapter_id = create_id(&chapter_ids, CHAPTER_PREFIX);
                chapter_ids.push(chapter_id.clone());
                let scene_numbers = self
                    .novel
                    .tree
                    .get_children(pl_id)
                    .iter()
                    .filter_map(|pp_id| refs.new_scene_ids.get(pp_id))
                    .map(|sc_id| sc_id[2..].to_string())
                    .collect();
                self.write_chapter(
                    w,
                    ChapterSpec {
                        yw_id: chapter_id[2..].to_string(),
                        title: plot_line.title(),
                        desc: plot_line.desc(),
                        chapter_type: ElementType::Todo,
                        part: false,
                        is_trash: false,
                        no_number: false,
                        arc_definition: plot_line.short_name(),
                        scene_numbers,
                    },
                )?;
            }
        }

        end(w, "CHAPTERS")
    }

    fn write_chapter(&self, w: &mut XmlWriter, spec: ChapterSpec<'_>) -> Result<(), Yw7Error> {
        let (unused, old_type, chapter_type) = encode_chapter_type(spec.chapter_type);

        start(w, "CHAPTER")?;
        leaf(w, "ID", &spec.yw_id)?;
        leaf_if(w, "Title", spec.title)?;
        leaf_if(w, "Desc", spec.desc)?;
        if unused {
            leaf(w, "Unused", "-1")?;
        }

        start(w, "Fields")?;
        match spec.arc_definition {
            Some(short_name) => {
                leaf(w, ChapterField::ArcDefinition.tag(), short_name)?;
            }
            None => {
                if spec.is_trash {
                    leaf(w, ChapterField::IsTrash.tag(), "1")?;
                }
                if spec.no_number {
                    leaf(w, ChapterField::NoNumber.tag(), "1")?;
                }
            }
        }
        end(w, "Fields")?;

        if spec.arc_definition.is_none() && spec.part {
            leaf(w, "SectionStart", "-1")?;
        }
        leaf(w, "Type", old_type)?;
        leaf(w, "ChapterType", chapter_type)?;

        if !spec.scene_numbers.is_empty() {
            start(w, "Scenes")?;
            for number in &spec.scene_numbers {
                leaf(w, "ScID", number)?;
            }
            end(w, "Scenes")?;
        }

        end(w, "CHAPTER")
    }

    fn write_wc_log(&self, w: &mut XmlWriter) -> Result<(), Yw7Error> {
        if self.wc_log.is_empty() {
            return Ok(());
        }
        start(w, "WCLog")?;
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
            leaf(w, "TotalCount", total)?;
            end(w, "WC")?;
        }
        end(w, "WCLog")
    }
}

fn write_tags(w: &mut XmlWriter, tags: &[String]) -> Result<(), Yw7Error> {
    if !tags.is_empty() {
        leaf(w, "Tags", &list_to_string(tags))?;
    }
    Ok(())
}

fn write_id_refs(
    w: &mut XmlWriter,
    container_tag: &str,
    entry_tag: &str,
    ids: &[String],
) -> Result<(), Yw7Error> {
    if ids.is_empty() {
        return Ok(());
    }
    start(w, container_tag)?;
    for id in ids {
        leaf(w, entry_tag, &id[2..])?;
    }
    end(w, container_tag)
}

/// CDATA-wraps the fixed tag allow-list and restores the literal
/// metacharacters the serializer escaped: the legacy format expects raw
/// markup fragments inside its CDATA text fields.
fn postprocess(xml: &str) -> String {
    let mut lines = vec![r#"<?xml version="1.0" encoding="utf-8"?>"#.to_string()];
    for line in xml.split('\n') {
        let mut line = line.to_string();
        for tag in CDATA_TAGS {
            line = line.replace(&format!("<{tag}>"), &format!("<{tag}><![CDATA["));
            line = line.replace(&format!("</{tag}>"), &format!("]]></{tag}>"));
        }
        lines.push(line);
    }
    let text = lines.join("\n");
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&apos;", "'")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}
