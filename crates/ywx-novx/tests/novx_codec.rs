//! Current-format codec integration tests: version gating, defaults,
//! type inheritance, association filtering, and write/read round trips.

use std::fs;

use tempfile::tempdir;
use ywx_model::id::{CH_ROOT, PL_ROOT};
use ywx_model::{Chapter, Character, ElementType, Novel, PlotLine, PlotPoint, SceneKind, Section};
use ywx_novx::{NovxError, NovxFile, MAJOR_VERSION, MINOR_VERSION};

fn document(version: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<novx version="{version}" xml:lang="de-DE">
  <PROJECT saveWordCount="1">
    <Title>Sample</Title>
    <Author>A. Writer</Author>
    <ReferenceDate>2024-07-13</ReferenceDate>
  </PROJECT>
  <CHAPTERS>
    <CHAPTER id="ch1" type="1">
      <Title>Notes chapter</Title>
      <SECTION id="sc1">
        <Title>First</Title>
        <Date>2024-07-14</Date>
        <Time>9:15</Time>
        <Characters ids="cr1 cr99"/>
        <Content><p>Hello <em>there</em>.</p></Content>
      </SECTION>
      <SECTION id="sc2" type="2" status="3" scene="2">
        <Title>Second</Title>
        <Day>2</Day>
      </SECTION>
    </CHAPTER>
  </CHAPTERS>
  <CHARACTERS>
    <CHARACTER id="cr1" major="1">
      <Title>Ann</Title>
    </CHARACTER>
  </CHARACTERS>
  <LOCATIONS></LOCATIONS>
  <ITEMS></ITEMS>
  <ARCS>
    <ARC id="ac1">
      <Title>Main thread</Title>
      <ShortName>A</ShortName>
      <Sections ids="sc1 sc77"/>
      <POINT id="ap1">
        <Title>Turn</Title>
        <Section id="sc1"/>
      </POINT>
    </ARC>
  </ARCS>
  <PROJECTNOTES></PROJECTNOTES>
  <PROGRESS>
    <WC><Date>2024-07-01</Date><Count>2</Count><WithUnused>3</WithUnused></WC>
  </PROGRESS>
</novx>
"#
    )
}

fn read_document(text: &str) -> Result<NovxFile, NovxError> {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sample.novx");
    fs::write(&path, text).unwrap();
    let mut file = NovxFile::new(&path);
    file.read()?;
    Ok(file)
}

fn current_version() -> String {
    format!("{MAJOR_VERSION}.{MINOR_VERSION}")
}

#[test]
fn newer_major_version_is_refused_without_mutation() {
    let result = read_document(&document(&format!("{}.0", MAJOR_VERSION + 1)));
    match result {
        Err(NovxError::CreatedWithNewer(_)) => {}
        Err(other) => panic!("expected CreatedWithNewer, got {other:?}"),
        Ok(_) => panic!("expected CreatedWithNewer, got a parsed file"),
    }

    // No partial read happens behind the version gate.
    let dir = tempdir().unwrap();
    let path = dir.path().join("sample.novx");
    fs::write(&path, document(&format!("{}.0", MAJOR_VERSION + 1))).unwrap();
    let mut file = NovxFile::new(&path);
    assert!(file.read().is_err());
    assert!(file.novel.sections.is_empty());
    assert!(file.novel.chapters.is_empty());
}

#[test]
fn older_major_and_newer_minor_are_refused() {
    assert!(matches!(
        read_document(&document(&format!("{}.0", MAJOR_VERSION - 1))),
        Err(NovxError::CreatedWithOlder(_))
    ));
    assert!(matches!(
        read_document(&document(&format!("{MAJOR_VERSION}.{}", MINOR_VERSION + 1))),
        Err(NovxError::CreatedWithNewer(_))
    ));
    assert!(matches!(
        read_document(&document("not-a-version")),
        Err(NovxError::BadVersion(_))
    ));
}

#[test]
fn wrong_root_element_is_refused() {
    assert!(matches!(
        read_document("<project version=\"1.4\"></project>"),
        Err(NovxError::BadRoot(_))
    ));
}

#[test]
fn malformed_entity_data_reads_as_corrupt() {
    let text = document(&current_version()).replace("2024-07-14", "not-a-date");
    assert!(matches!(read_document(&text), Err(NovxError::Corrupt(_))));
}

#[test]
fn chapter_type_is_inherited_by_contained_sections() {
    let file = read_document(&document(&current_version())).unwrap();
    // Chapter is type 1; sc1 was type 0 and is lifted, sc2 stays higher.
    assert_eq!(
        file.novel.sections["sc1"].section_type(),
        ElementType::Notes
    );
    assert_eq!(file.novel.sections["sc2"].section_type(), ElementType::Todo);
}

#[test]
fn locale_defaults_and_dates_are_read() {
    let file = read_document(&document(&current_version())).unwrap();
    assert_eq!(file.novel.language_code().map(String::as_str), Some("de"));
    assert_eq!(file.novel.country_code().map(String::as_str), Some("DE"));
    let section = &file.novel.sections["sc1"];
    assert_eq!(section.date().map(String::as_str), Some("2024-07-14"));
    assert_eq!(section.time().map(String::as_str), Some("9:15:00"));
    assert_eq!(section.status(), 1);
    let second = &file.novel.sections["sc2"];
    assert_eq!(second.day().map(String::as_str), Some("2"));
    assert_eq!(second.status(), 3);
    assert_eq!(second.scene(), SceneKind::Reaction);
}

#[test]
fn dangling_association_ids_are_dropped_silently() {
    let file = read_document(&document(&current_version())).unwrap();
    assert_eq!(
        file.novel.sections["sc1"].characters(),
        &["cr1".to_string()]
    );
    let plot_line = &file.novel.plot_lines["ac1"];
    assert_eq!(plot_line.sections(), &["sc1".to_string()]);
    // Derived back-references follow the surviving associations.
    assert_eq!(file.novel.sections["sc1"].sc_plot_lines, ["ac1"]);
    assert_eq!(
        file.novel.sections["sc1"].sc_plot_points.get("ap1"),
        Some(&"ac1".to_string())
    );
}

#[test]
fn inline_content_is_preserved_verbatim() {
    let file = read_document(&document(&current_version())).unwrap();
    assert_eq!(
        file.novel.sections["sc1"].section_content().map(String::as_str),
        Some("<p>Hello <em>there</em>.</p>")
    );
}

fn sample_novel() -> Novel {
    let mut novel = Novel::default();
    novel.set_title(Some("Round trip".to_string()));
    novel.set_author_name(Some("A. Writer".to_string()));
    novel.set_language_code(Some("en".to_string()));
    novel.set_country_code(Some("US".to_string()));

    let mut chapter = Chapter::default();
    chapter.set_title(Some("One".to_string()));
    novel.chapters.insert("ch1".to_string(), chapter);
    novel.tree.append(CH_ROOT, "ch1");

    let mut section = Section::default();
    section.set_title(Some("Opening".to_string()));
    section.set_desc(Some("Two\nparagraphs".to_string()));
    section.set_section_content(Some(
        "<p>Hello <strong>world</strong>.</p><p><em>Next</em> line.</p>".to_string(),
    ));
    section.set_day(Some("3".to_string()));
    section.set_status(4);
    novel.sections.insert("sc1".to_string(), section);
    novel.tree.append("ch1", "sc1");

    let mut character = Character::default();
    character.set_title(Some("Ann".to_string()));
    character.set_is_major(true);
    novel.characters.insert("cr1".to_string(), character);
    novel.tree.append(ywx_model::id::CR_ROOT, "cr1");

    let mut plot_line = PlotLine::default();
    plot_line.set_title(Some("Main".to_string()));
    plot_line.set_short_name(Some("A".to_string()));
    plot_line.set_sections(vec!["sc1".to_string()]);
    novel.plot_lines.insert("ac1".to_string(), plot_line);
    novel.tree.append(PL_ROOT, "ac1");

    let mut plot_point = PlotPoint::default();
    plot_point.set_title(Some("Turn".to_string()));
    plot_point.set_section_assoc(Some("sc1".to_string()));
    novel.plot_points.insert("ap1".to_string(), plot_point);
    novel.tree.append("ac1", "ap1");

    novel
}

#[test]
fn write_emits_header_and_versioned_root() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.novx");
    let mut file = NovxFile::new(&path);
    file.novel = sample_novel();
    file.write().unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
    assert!(text.contains(&format!(
        "<!DOCTYPE novx SYSTEM \"novx_{MAJOR_VERSION}_{MINOR_VERSION}.dtd\">"
    )));
    assert!(text.contains("<?xml-stylesheet href=\"novx.css\" type=\"text/css\"?>"));
    assert!(text.contains(&format!("version=\"{}\"", current_version())));
    assert!(text.contains("xml:lang=\"en-US\""));
    assert!(text.contains("<Sections ids=\"sc1\"/>"));
}

#[test]
fn write_then_read_round_trips_the_model() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("round.novx");
    let mut file = NovxFile::new(&path);
    file.novel = sample_novel();
    file.write().unwrap();

    let mut reread = NovxFile::new(&path);
    reread.read().unwrap();

    let section = &reread.novel.sections["sc1"];
    assert_eq!(section.title().map(String::as_str), Some("Opening"));
    assert_eq!(section.desc().map(String::as_str), Some("Two\nparagraphs"));
    assert_eq!(
        section.section_content().map(String::as_str),
        Some("<p>Hello <strong>world</strong>.</p><p><em>Next</em> line.</p>")
    );
    assert_eq!(section.day().map(String::as_str), Some("3"));
    assert_eq!(section.date(), None);
    assert_eq!(section.status(), 4);
    assert!(reread.novel.characters["cr1"].is_major());
    assert_eq!(
        reread.novel.plot_points["ap1"].section_assoc().map(String::as_str),
        Some("sc1")
    );
    assert_eq!(reread.novel.tree.get_children("ac1"), ["ap1"]);
}

#[test]
fn word_count_log_deduplicates_only_when_tracking() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wc.novx");
    let mut file = NovxFile::new(&path);
    file.novel = sample_novel();
    file.novel.set_save_word_count(true);
    file.wc_log
        .insert("2024-07-01".to_string(), ("5".to_string(), "5".to_string()));
    file.wc_log
        .insert("2024-07-02".to_string(), ("5".to_string(), "5".to_string()));
    file.wc_log
        .insert("2024-07-03".to_string(), ("9".to_string(), "9".to_string()));
    file.write().unwrap();

    let text = fs::read_to_string(&path).unwrap();
    // Three stored entries, one duplicate dropped, plus today's appended
    // entry from the tracking option.
    assert_eq!(text.matches("<WC>").count(), 3);
    assert!(text.contains("<Date>2024-07-01</Date>"));
    assert!(!text.contains("<Date>2024-07-02</Date>"));
    assert!(text.contains("<Date>2024-07-03</Date>"));
}
