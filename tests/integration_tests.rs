//! Integration tests for the complete conversion pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - yw7 read → document model → novx write
//! - novx read → document model → yw7 write
//! - inline markup surviving a full there-and-back conversion
//!
//! Run with: cargo test --test integration_tests

use std::fs;

use tempfile::tempdir;
use ywx_novx::NovxFile;
use ywx_yw7::Yw7File;

const LEGACY_PROJECT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<YWRITER7>
  <PROJECT>
    <Ver>7</Ver>
    <Title><![CDATA[Pipeline]]></Title>
    <AuthorName><![CDATA[A. Writer]]></AuthorName>
    <Fields></Fields>
  </PROJECT>
  <LOCATIONS></LOCATIONS>
  <ITEMS></ITEMS>
  <CHARACTERS>
    <CHARACTER><ID>1</ID><Title><![CDATA[Ann]]></Title></CHARACTER>
  </CHARACTERS>
  <PROJECTVARS></PROJECTVARS>
  <SCENES>
    <SCENE>
      <ID>1</ID>
      <Title><![CDATA[Opening]]></Title>
      <Status>2</Status>
      <SceneContent><![CDATA[Hello [b]world[/b].
[i]Next[/i] line.]]></SceneContent>
      <Characters><CharID>1</CharID></Characters>
    </SCENE>
    <SCENE>
      <ID>2</ID>
      <Title><![CDATA[Milestone]]></Title>
      <Fields><Field_SceneAssoc>1</Field_SceneAssoc></Fields>
    </SCENE>
  </SCENES>
  <CHAPTERS>
    <CHAPTER>
      <ID>1</ID>
      <Title><![CDATA[One]]></Title>
      <Type>0</Type>
      <ChapterType>0</ChapterType>
      <Scenes><ScID>1</ScID></Scenes>
    </CHAPTER>
    <CHAPTER>
      <ID>2</ID>
      <Title><![CDATA[Main arc]]></Title>
      <Unused>-1</Unused>
      <Fields><Field_ArcDefinition>A</Field_ArcDefinition></Fields>
      <Type>1</Type>
      <ChapterType>2</ChapterType>
      <Scenes><ScID>2</ScID></Scenes>
    </CHAPTER>
  </CHAPTERS>
</YWRITER7>
"#;

/// yw7 → novx, mirroring the CLI `convert` flow.
fn convert_to_novx(yw7_path: &std::path::Path) -> std::path::PathBuf {
    let mut source = Yw7File::new(yw7_path);
    source.read().expect("legacy project reads");
    let novx_path = yw7_path.with_extension("novx");
    let mut target = NovxFile::new(&novx_path);
    target.novel = std::mem::take(&mut source.novel);
    target.wc_log = std::mem::take(&mut source.wc_log);
    target.write().expect("novx project writes");
    novx_path
}

#[test]
fn test_yw7_to_novx_full_pipeline() {
    let dir = tempdir().unwrap();
    let yw7_path = dir.path().join("pipeline.yw7");
    fs::write(&yw7_path, LEGACY_PROJECT).unwrap();

    let novx_path = convert_to_novx(&yw7_path);
    let text = fs::read_to_string(&novx_path).unwrap();
    assert!(text.contains("<novx version="));
    assert!(text.contains("<ARC id=\"ac2\">"));
    assert!(text.contains("<POINT id=\"ap2\">"));
    assert!(text.contains("<Section id=\"sc1\"/>"));
    assert!(text.contains("Hello <strong>world</strong>."));

    let mut converted = NovxFile::new(&novx_path);
    converted.read().expect("converted project reads back");
    assert_eq!(
        converted.novel.title().map(String::as_str),
        Some("Pipeline")
    );
    assert!(converted.novel.chapters.contains_key("ch1"));
    assert!(!converted.novel.chapters.contains_key("ch2"));
    assert_eq!(
        converted.novel.plot_lines["ac2"]
            .short_name()
            .map(String::as_str),
        Some("A")
    );
    assert_eq!(
        converted.novel.plot_points["ap2"]
            .section_assoc()
            .map(String::as_str),
        Some("sc1")
    );
}

#[test]
fn test_markup_survives_there_and_back() {
    let dir = tempdir().unwrap();
    let yw7_path = dir.path().join("markup.yw7");
    fs::write(&yw7_path, LEGACY_PROJECT).unwrap();

    let novx_path = convert_to_novx(&yw7_path);

    // novx → yw7, mirroring the CLI `export` flow.
    let mut source = NovxFile::new(&novx_path);
    source.read().expect("novx project reads");
    let exported_path = dir.path().join("exported.yw7");
    let mut target = Yw7File::new(&exported_path);
    target.novel = std::mem::take(&mut source.novel);
    target.wc_log = std::mem::take(&mut source.wc_log);
    target.write().expect("legacy project writes");

    let mut round = Yw7File::new(&exported_path);
    round.read().expect("exported project reads back");
    let section = &round.novel.sections["sc1"];
    assert_eq!(
        section.section_content().map(String::as_str),
        Some("<p>Hello <strong>world</strong>.</p><p><em>Next</em> line.</p>")
    );
    assert_eq!(section.status(), 2);
    assert_eq!(section.characters(), &["cr1".to_string()]);
}

#[test]
fn test_word_counts_carry_into_the_progress_log() {
    let dir = tempdir().unwrap();
    let yw7_path = dir.path().join("counted.yw7");
    fs::write(
        &yw7_path,
        LEGACY_PROJECT.replace(
            "<Fields></Fields>",
            "<Fields><Field_SaveWordCount>1</Field_SaveWordCount></Fields>",
        ),
    )
    .unwrap();

    let novx_path = convert_to_novx(&yw7_path);
    let text = fs::read_to_string(&novx_path).unwrap();
    // Tracking is on, so the writer appends today's computed counts.
    assert!(text.contains("<PROGRESS>"));
    assert!(text.contains("<WithUnused>"));
}
