//! Keyword-variable tables and the sentinel-element type encodings.
//!
//! The legacy format stores typed extension data as named children of a
//! `Fields` container. Field names are enum-keyed here so every read and
//! write site is exhaustive over the fields it handles, and the 4-way
//! scene/chapter type encodings are literal lookup tables.

use ywx_model::ElementType;

/// Tag marking a scene as a stage (structural placeholder) rather than
/// narrative content.
pub const STAGE_MARKER: &str = "stage";

// ============================================================================
// Keyword variables
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ProjectField {
    WorkPhase,
    RenumberChapters,
    RenumberParts,
    RenumberWithinParts,
    RomanChapterNumbers,
    RomanPartNumbers,
    ChapterHeadingPrefix,
    ChapterHeadingSuffix,
    PartHeadingPrefix,
    PartHeadingSuffix,
    CustomGoal,
    CustomConflict,
    CustomOutcome,
    CustomChrBio,
    CustomChrGoals,
    SaveWordCount,
    ReferenceDate,
    LanguageCode,
    CountryCode,
}

impl ProjectField {
    pub const ALL: [Self; 19] = [
        Self::WorkPhase,
        Self::RenumberChapters,
        Self::RenumberParts,
        Self::RenumberWithinParts,
        Self::RomanChapterNumbers,
        Self::RomanPartNumbers,
        Self::ChapterHeadingPrefix,
        Self::ChapterHeadingSuffix,
        Self::PartHeadingPrefix,
        Self::PartHeadingSuffix,
        Self::CustomGoal,
        Self::CustomConflict,
        Self::CustomOutcome,
        Self::CustomChrBio,
        Self::CustomChrGoals,
        Self::SaveWordCount,
        Self::ReferenceDate,
        Self::LanguageCode,
        Self::CountryCode,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Self::WorkPhase => "Field_WorkPhase",
            Self::RenumberChapters => "Field_RenumberChapters",
            Self::RenumberParts => "Field_RenumberParts",
            Self::RenumberWithinParts => "Field_RenumberWithinParts",
            Self::RomanChapterNumbers => "Field_RomanChapterNumbers",
            Self::RomanPartNumbers => "Field_RomanPartNumbers",
            Self::ChapterHeadingPrefix => "Field_ChapterHeadingPrefix",
            Self::ChapterHeadingSuffix => "Field_ChapterHeadingSuffix",
            Self::PartHeadingPrefix => "Field_PartHeadingPrefix",
            Self::PartHeadingSuffix => "Field_PartHeadingSuffix",
            Self::CustomGoal => "Field_CustomGoal",
            Self::CustomConflict => "Field_CustomConflict",
            Self::CustomOutcome => "Field_CustomOutcome",
            Self::CustomChrBio => "Field_CustomChrBio",
            Self::CustomChrGoals => "Field_CustomChrGoals",
            Self::SaveWordCount => "Field_SaveWordCount",
            Self::ReferenceDate => "Field_ReferenceDate",
            Self::LanguageCode => "Field_LanguageCode",
            Self::CountryCode => "Field_CountryCode",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ChapterField {
    IsTrash,
    NoNumber,
    ArcDefinition,
    /// Older snapshot spelling, tolerated on read and preferred when both
    /// occur.
    ArcDefinitionLegacy,
}

impl ChapterField {
    pub const ALL: [Self; 4] = [
        Self::IsTrash,
        Self::NoNumber,
        Self::ArcDefinition,
        Self::ArcDefinitionLegacy,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Self::IsTrash => "Field_IsTrash",
            Self::NoNumber => "Field_NoNumber",
            Self::ArcDefinition => "Field_ArcDefinition",
            Self::ArcDefinitionLegacy => "Field_Arc_Definition",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SceneField {
    SceneType,
    SceneArcs,
    SceneAssoc,
    CustomAr,
}

impl SceneField {
    pub const ALL: [Self; 4] = [
        Self::SceneType,
        Self::SceneArcs,
        Self::SceneAssoc,
        Self::CustomAr,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Self::SceneType => "Field_SceneType",
            Self::SceneArcs => "Field_SceneArcs",
            Self::SceneAssoc => "Field_SceneAssoc",
            Self::CustomAr => "Field_CustomAR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum CharacterField {
    BirthDate,
    DeathDate,
}

impl CharacterField {
    pub const ALL: [Self; 2] = [Self::BirthDate, Self::DeathDate];

    pub fn tag(self) -> &'static str {
        match self {
            Self::BirthDate => "Field_BirthDate",
            Self::DeathDate => "Field_DeathDate",
        }
    }
}

// ============================================================================
// Type encodings
// ============================================================================

/// Scene side: semantic type -> (`Unused` sentinel, `Field_SceneType`).
pub(crate) fn encode_scene_type(section_type: ElementType) -> (bool, Option<&'static str>) {
    match section_type {
        ElementType::Normal => (false, None),
        ElementType::Notes => (true, Some("1")),
        ElementType::Todo => (true, Some("2")),
        ElementType::Unused => (true, Some("0")),
    }
}

/// Scene side: (`Unused` sentinel, `Field_SceneType`) -> semantic type.
/// Exhaustive inverse of [`encode_scene_type`]; unrecognized codes fall
/// back on the sentinel alone.
pub(crate) fn decode_scene_type(unused: bool, type_code: Option<&str>) -> ElementType {
    match (unused, type_code) {
        (_, Some("1")) => ElementType::Notes,
        (_, Some("2")) => ElementType::Todo,
        (true, _) => ElementType::Unused,
        (false, _) => ElementType::Normal,
    }
}

/// Chapter side: semantic type -> (`Unused` sentinel, `Type`,
/// `ChapterType`).
pub(crate) fn encode_chapter_type(
    chapter_type: ElementType,
) -> (bool, &'static str, &'static str) {
    match chapter_type {
        ElementType::Normal => (false, "0", "0"),
        ElementType::Notes => (true, "1", "1"),
        ElementType::Todo => (true, "1", "2"),
        ElementType::Unused => (true, "1", "0"),
    }
}

/// Chapter side: sentinels -> semantic type. `ChapterType` wins over the
/// older `Type` element when both are present.
pub(crate) fn decode_chapter_type(
    unused: bool,
    chapter_type: Option<&str>,
    old_type: Option<&str>,
) -> ElementType {
    match chapter_type {
        Some("1") => ElementType::Notes,
        Some("2") => ElementType::Todo,
        Some(_) => {
            if unused {
                ElementType::Unused
            } else {
                ElementType::Normal
            }
        }
        None => match old_type {
            Some("1") => {
                if unused {
                    ElementType::Unused
                } else {
                    ElementType::Notes
                }
            }
            _ => {
                if unused {
                    ElementType::Unused
                } else {
                    ElementType::Normal
                }
            }
        },
    }
}

/// Elements whose text is CDATA-wrapped after serialization.
pub(crate) const CDATA_TAGS: [&str; 32] = [
    "Title",
    "AuthorName",
    "Bio",
    "Desc",
    "FieldTitle1",
    "FieldTitle2",
    "FieldTitle3",
    "FieldTitle4",
    "LaTeXHeaderFile",
    "Tags",
    "AKA",
    "ImageFile",
    "FullName",
    "Goals",
    "Notes",
    "RTFFile",
    "SceneContent",
    "Outcome",
    "Goal",
    "Conflict",
    "Field_ChapterHeadingPrefix",
    "Field_ChapterHeadingSuffix",
    "Field_PartHeadingPrefix",
    "Field_PartHeadingSuffix",
    "Field_CustomGoal",
    "Field_CustomConflict",
    "Field_CustomOutcome",
    "Field_CustomChrBio",
    "Field_CustomChrGoals",
    "Field_ArcDefinition",
    "Field_SceneArcs",
    "Field_CustomAR",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_type_encoding_round_trips() {
        for section_type in [
            ElementType::Normal,
            ElementType::Notes,
            ElementType::Todo,
            ElementType::Unused,
        ] {
            let (unused, code) = encode_scene_type(section_type);
            assert_eq!(decode_scene_type(unused, code), section_type);
        }
    }

    #[test]
    fn chapter_type_encoding_round_trips() {
        for chapter_type in [
            ElementType::Normal,
            ElementType::Notes,
            ElementType::Todo,
            ElementType::Unused,
        ] {
            let (unused, _, code) = encode_chapter_type(chapter_type);
            assert_eq!(decode_chapter_type(unused, Some(code), None), chapter_type);
        }
    }

    #[test]
    fn plain_unused_sentinel_decodes_as_unused() {
        assert_eq!(decode_scene_type(true, None), ElementType::Unused);
        assert_eq!(decode_scene_type(false, None), ElementType::Normal);
    }
}
