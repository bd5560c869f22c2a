//! Neutral cell-style descriptors.
//!
//! An index sheet read with umya is described with these types before it is
//! rendered again through rust_xlsxwriter. Every field is optional; `None`
//! means the attribute is left at the workbook default.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StyleDescriptor {
    pub font: Option<FontDescriptor>,
    pub fill: Option<FillDescriptor>,
    pub borders: Option<BordersDescriptor>,
    pub alignment: Option<AlignmentDescriptor>,
    pub number_format: Option<String>,
    pub protection: Option<ProtectionDescriptor>,
}

impl StyleDescriptor {
    pub fn is_default(&self) -> bool {
        self.font.is_none()
            && self.fill.is_none()
            && self.borders.is_none()
            && self.alignment.is_none()
            && self.number_format.is_none()
            && self.protection.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FontDescriptor {
    pub name: Option<String>,
    pub size: Option<f64>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<String>,
    pub strikethrough: Option<bool>,
    /// Resolved `AARRGGBB`
    pub color: Option<String>,
}

/// Pattern fill. Gradient fills are not carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FillDescriptor {
    pub pattern_type: Option<String>,
    pub foreground_color: Option<String>,
    pub background_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BordersDescriptor {
    pub left: Option<BorderSideDescriptor>,
    pub right: Option<BorderSideDescriptor>,
    pub top: Option<BorderSideDescriptor>,
    pub bottom: Option<BorderSideDescriptor>,
    pub diagonal: Option<BorderSideDescriptor>,
    pub diagonal_up: Option<bool>,
    pub diagonal_down: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BorderSideDescriptor {
    pub style: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AlignmentDescriptor {
    pub horizontal: Option<String>,
    pub vertical: Option<String>,
    pub wrap_text: Option<bool>,
    pub text_rotation: Option<u32>,
}

/// Cell protection. Excel cells are locked and visible unless told otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProtectionDescriptor {
    pub locked: Option<bool>,
    pub hidden: Option<bool>,
}
