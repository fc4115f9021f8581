//! Collection upgrade: `.pwc` series/book lists referencing yWriter 7
//! projects become `.nvcx` lists referencing novx projects, converting
//! each referenced project on demand.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use roxmltree::{Document, Node};
use tracing::{debug, info};
use ywx_novx::write_with_backup;

use crate::convert::yw7_to_novx;

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
    <!DOCTYPE COLLECTION SYSTEM \"nvcx_1_0.dtd\">\n\
    <?xml-stylesheet href=\"collection.css\" type=\"text/css\"?>\n";

/// Tag/attribute names of one collection schema generation.
struct SchemaMap {
    collection: &'static str,
    series: &'static str,
    book: &'static str,
    id: &'static str,
    path: &'static str,
    title: &'static str,
    desc: &'static str,
}

const V1_MAP: SchemaMap = SchemaMap {
    collection: "collection",
    series: "series",
    book: "book",
    id: "id",
    path: "path",
    title: "title",
    desc: "desc",
};

const OLD_MAP: SchemaMap = SchemaMap {
    collection: "COLLECTION",
    series: "SERIES",
    book: "BOOK",
    id: "ID",
    path: "Path",
    title: "Title",
    desc: "Desc",
};

type XmlWriter = Writer<Vec<u8>>;

fn write_error(e: impl std::fmt::Display) -> anyhow::Error {
    anyhow!("XML serialization failed: {e}")
}

/// Upgrades `source.pwc` to its sibling `source.nvcx`.
pub fn upgrade(source: &Path) -> Result<PathBuf> {
    let extension = source.extension().and_then(|e| e.to_str()).unwrap_or("");
    if extension != "pwc" {
        bail!("file must be .pwc type, but is \".{extension}\"");
    }
    let target_path = source.with_extension("nvcx");

    let text = std::fs::read_to_string(source)
        .map_err(|e| anyhow!("cannot read file \"{}\": {e}", source.display()))?;
    let doc = Document::parse(&text)
        .map_err(|e| anyhow!("cannot process file \"{}\" - {e}", source.display()))?;
    let root = doc.root_element();

    let map = if root.has_tag_name(V1_MAP.collection) {
        &V1_MAP
    } else if root.has_tag_name(OLD_MAP.collection) {
        &OLD_MAP
    } else {
        bail!("no collection found in file: \"{}\"", source.display());
    };

    let major_version: u32 = root
        .attribute("version")
        .and_then(|version| version.split('.').next())
        .and_then(|major| major.parse().ok())
        .ok_or_else(|| anyhow!("no valid version found in file: \"{}\"", source.display()))?;
    if major_version > 1 {
        bail!("the collection was created with a newer plugin version");
    }

    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    let mut element = BytesStart::new("COLLECTION");
    element.push_attribute(("version", "1.0"));
    w.write_event(Event::Start(element)).map_err(write_error)?;

    for child in root.children().filter(|n| n.is_element()) {
        if child.has_tag_name(map.book) {
            write_element(&mut w, child, map, "BOOK", "bk")?;
        } else if child.has_tag_name(map.series) {
            let mut series = BytesStart::new("SERIES");
            set_id(&mut series, child, map, "sr")?;
            w.write_event(Event::Start(series)).map_err(write_error)?;
            write_title_desc_path(&mut w, child, map)?;
            for book in child.children().filter(|n| n.has_tag_name(map.book)) {
                write_element(&mut w, book, map, "BOOK", "bk")?;
            }
            w.write_event(Event::End(BytesEnd::new("SERIES")))
                .map_err(write_error)?;
        }
    }

    w.write_event(Event::End(BytesEnd::new("COLLECTION")))
        .map_err(write_error)?;
    let xml = String::from_utf8(w.into_inner())?;

    write_with_backup(&target_path, &format!("{XML_HEADER}{xml}"))?;
    info!(target = %target_path.display(), "collection upgraded");
    Ok(target_path)
}

fn set_id(
    element: &mut BytesStart<'_>,
    node: Node<'_, '_>,
    map: &SchemaMap,
    prefix: &str,
) -> Result<()> {
    let id = node
        .attribute(map.id)
        .ok_or_else(|| anyhow!("collection element without {} attribute", map.id))?;
    element.push_attribute(("id", format!("{prefix}{id}").as_str()));
    Ok(())
}

fn write_element(
    w: &mut XmlWriter,
    node: Node<'_, '_>,
    map: &SchemaMap,
    tag: &'static str,
    prefix: &str,
) -> Result<()> {
    let mut element = BytesStart::new(tag);
    set_id(&mut element, node, map, prefix)?;
    w.write_event(Event::Start(element)).map_err(write_error)?;
    write_title_desc_path(w, node, map)?;
    w.write_event(Event::End(BytesEnd::new(tag)))
        .map_err(write_error)?;
    Ok(())
}

fn write_title_desc_path(w: &mut XmlWriter, node: Node<'_, '_>, map: &SchemaMap) -> Result<()> {
    let child_text = |tag: &str| {
        node.children()
            .find(|n| n.has_tag_name(tag))
            .and_then(|n| n.text())
    };

    if let Some(title) = child_text(map.title) {
        if !title.is_empty() {
            leaf(w, "Title", title)?;
        }
    }
    if let Some(desc) = child_text(map.desc) {
        if !desc.is_empty() {
            w.write_event(Event::Start(BytesStart::new("Desc")))
                .map_err(write_error)?;
            for paragraph in desc.split('\n') {
                leaf(w, "p", paragraph.trim())?;
            }
            w.write_event(Event::End(BytesEnd::new("Desc")))
                .map_err(write_error)?;
        }
    }
    if let Some(book_path) = child_text(map.path) {
        let book_path = Path::new(book_path);
        if book_path.is_file()
            && book_path.extension().and_then(|e| e.to_str()) == Some(ywx_yw7::EXTENSION)
        {
            let novx_path = book_path.with_extension(ywx_novx::EXTENSION);
            if !novx_path.is_file() {
                debug!(book = %book_path.display(), "converting referenced project");
                yw7_to_novx(book_path)?;
            }
            leaf(w, "Path", &novx_path.to_string_lossy())?;
        }
    }
    Ok(())
}

fn leaf(w: &mut XmlWriter, tag: &str, text: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(tag)))
        .map_err(write_error)?;
    w.write_event(Event::Text(BytesText::new(text)))
        .map_err(write_error)?;
    w.write_event(Event::End(BytesEnd::new(tag)))
        .map_err(write_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const MINIMAL_YW7: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<YWRITER7>
  <PROJECT><Ver>7</Ver><Title><![CDATA[Book one]]></Title><Fields></Fields></PROJECT>
  <LOCATIONS></LOCATIONS>
  <ITEMS></ITEMS>
  <CHARACTERS></CHARACTERS>
  <PROJECTVARS></PROJECTVARS>
  <SCENES>
    <SCENE><ID>1</ID><Title><![CDATA[Only]]></Title><SceneContent><![CDATA[Words.]]></SceneContent></SCENE>
  </SCENES>
  <CHAPTERS>
    <CHAPTER><ID>1</ID><Title><![CDATA[One]]></Title><Type>0</Type><ChapterType>0</ChapterType><Scenes><ScID>1</ScID></Scenes></CHAPTER>
  </CHAPTERS>
</YWRITER7>
"#;

    #[test]
    fn wrong_extension_is_refused() {
        assert!(upgrade(Path::new("books.txt")).is_err());
    }

    #[test]
    fn old_schema_collection_is_upgraded_and_books_converted() {
        let dir = tempdir().unwrap();
        let book_path = dir.path().join("book1.yw7");
        fs::write(&book_path, MINIMAL_YW7).unwrap();

        let collection_path = dir.path().join("books.pwc");
        let collection = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<COLLECTION version="1.0">
  <SERIES ID="1">
    <Title>My series</Title>
    <BOOK ID="1">
      <Title>Book one</Title>
      <Desc>First line
Second line</Desc>
      <Path>{}</Path>
    </BOOK>
  </SERIES>
</COLLECTION>
"#,
            book_path.display()
        );
        fs::write(&collection_path, collection).unwrap();

        let target = upgrade(&collection_path).unwrap();
        assert_eq!(target, dir.path().join("books.nvcx"));

        // The referenced project was converted on demand.
        assert!(dir.path().join("book1.novx").is_file());

        let text = fs::read_to_string(&target).unwrap();
        assert!(text.contains("<!DOCTYPE COLLECTION SYSTEM \"nvcx_1_0.dtd\">"));
        assert!(text.contains("<SERIES id=\"sr1\">"));
        assert!(text.contains("<BOOK id=\"bk1\">"));
        assert!(text.contains("book1.novx</Path>"));
        assert!(text.contains("<p>First line</p>"));
    }

    #[test]
    fn newer_collection_version_is_refused() {
        let dir = tempdir().unwrap();
        let collection_path = dir.path().join("books.pwc");
        fs::write(
            &collection_path,
            "<collection version=\"2.0\"></collection>",
        )
        .unwrap();
        assert!(upgrade(&collection_path).is_err());
    }
}
