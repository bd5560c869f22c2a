use crate::model::{
    AlignmentDescriptor, BorderSideDescriptor, BordersDescriptor, FillDescriptor, FontDescriptor,
    ProtectionDescriptor, StyleDescriptor,
};
use rust_xlsxwriter::{
    Color, Format, FormatAlign, FormatBorder, FormatDiagonalBorder, FormatPattern, FormatUnderline,
};
use sha2::{Digest, Sha256};
use umya_spreadsheet::structs::drawing::Theme;
use umya_spreadsheet::structs::{EnumTrait, HorizontalAlignmentValues, VerticalAlignmentValues};
use umya_spreadsheet::{Border, Fill, Font, Style};

pub const DATE_FORMAT: &str = "yyyy-mm-dd";
pub const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Header style used when a sheet is written without a table:
/// bold, thin border on every side, centred horizontally, top-aligned.
pub fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::Top)
}

pub fn placeholder_format() -> Format {
    Format::new().set_bold()
}

pub fn descriptor_from_style(style: &Style, theme: &Theme) -> StyleDescriptor {
    let font = style.get_font().and_then(|font| descriptor_from_font(font, theme));
    let fill = style.get_fill().and_then(|fill| descriptor_from_fill(fill, theme));
    let borders = style.get_borders().and_then(|borders| {
        let descriptor = BordersDescriptor {
            left: descriptor_from_border_side(borders.get_left_border(), theme),
            right: descriptor_from_border_side(borders.get_right_border(), theme),
            top: descriptor_from_border_side(borders.get_top_border(), theme),
            bottom: descriptor_from_border_side(borders.get_bottom_border(), theme),
            diagonal: descriptor_from_border_side(borders.get_diagonal_border(), theme),
            diagonal_up: Some(true).filter(|_| *borders.get_diagonal_up()),
            diagonal_down: Some(true).filter(|_| *borders.get_diagonal_down()),
        };
        if descriptor.is_empty() {
            None
        } else {
            Some(descriptor)
        }
    });
    let alignment = style.get_alignment().and_then(descriptor_from_alignment);
    let number_format = style.get_number_format().and_then(|fmt| {
        let code = fmt.get_format_code();
        if code.is_empty() || code.eq_ignore_ascii_case("general") {
            None
        } else {
            Some(code.to_string())
        }
    });
    let protection = style.get_protection().and_then(|protection| {
        // umya exposes `hidden` through a mutable getter
        let mut protection = protection.clone();
        let descriptor = ProtectionDescriptor {
            locked: Some(false).filter(|_| !*protection.get_locked()),
            hidden: Some(true).filter(|_| *protection.get_hidden()),
        };
        if descriptor.is_empty() {
            None
        } else {
            Some(descriptor)
        }
    });

    StyleDescriptor {
        font,
        fill,
        borders,
        alignment,
        number_format,
        protection,
    }
}

/// Content hash of a descriptor, used to share one `Format` between cells.
pub fn stable_style_id(descriptor: &StyleDescriptor) -> String {
    let bytes = serde_json::to_vec(descriptor).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let hex = format!("{digest:x}");
    hex.chars().take(12).collect()
}

fn resolve_color(color: &umya_spreadsheet::Color, theme: &Theme) -> Option<String> {
    Some(color.get_argb_with_theme(theme).into_owned()).filter(|argb| !argb.is_empty())
}

fn descriptor_from_font(font: &Font, theme: &Theme) -> Option<FontDescriptor> {
    let underline = font.get_underline();

    let descriptor = FontDescriptor {
        name: Some(font.get_name().to_string()).filter(|s| !s.is_empty()),
        size: Some(*font.get_size()).filter(|s| *s > 0.0),
        bold: Some(true).filter(|_| *font.get_bold()),
        italic: Some(true).filter(|_| *font.get_italic()),
        underline: if underline.is_empty() || underline.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(underline.to_string())
        },
        strikethrough: Some(true).filter(|_| *font.get_strikethrough()),
        color: resolve_color(font.get_color(), theme),
    };

    if descriptor.is_empty() {
        None
    } else {
        Some(descriptor)
    }
}

fn descriptor_from_fill(fill: &Fill, theme: &Theme) -> Option<FillDescriptor> {
    let pattern = fill.get_pattern_fill()?;
    let kind = pattern.get_pattern_type().get_value_string();
    let foreground_color = pattern
        .get_foreground_color()
        .and_then(|color| resolve_color(color, theme));
    let background_color = pattern
        .get_background_color()
        .and_then(|color| resolve_color(color, theme));

    if kind.eq_ignore_ascii_case("none") {
        return None;
    }

    Some(FillDescriptor {
        pattern_type: Some(kind.to_string()),
        foreground_color,
        background_color,
    })
}

fn descriptor_from_border_side(border: &Border, theme: &Theme) -> Option<BorderSideDescriptor> {
    let style = border.get_border_style();
    if style.is_empty() || style.eq_ignore_ascii_case("none") {
        return None;
    }
    Some(BorderSideDescriptor {
        style: Some(style.to_string()),
        color: resolve_color(border.get_color(), theme),
    })
}

fn descriptor_from_alignment(alignment: &umya_spreadsheet::Alignment) -> Option<AlignmentDescriptor> {
    let horizontal = if alignment.get_horizontal() != &HorizontalAlignmentValues::General {
        Some(alignment.get_horizontal().get_value_string().to_string())
    } else {
        None
    };
    let vertical = if alignment.get_vertical() != &VerticalAlignmentValues::Bottom {
        Some(alignment.get_vertical().get_value_string().to_string())
    } else {
        None
    };

    let descriptor = AlignmentDescriptor {
        horizontal,
        vertical,
        wrap_text: Some(true).filter(|_| *alignment.get_wrap_text()),
        text_rotation: Some(*alignment.get_text_rotation()).filter(|r| *r != 0),
    };
    if descriptor.is_empty() {
        None
    } else {
        Some(descriptor)
    }
}

trait IsEmpty {
    fn is_empty(&self) -> bool;
}

impl IsEmpty for FontDescriptor {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.size.is_none()
            && self.bold.is_none()
            && self.italic.is_none()
            && self.underline.is_none()
            && self.strikethrough.is_none()
            && self.color.is_none()
    }
}

impl IsEmpty for BordersDescriptor {
    fn is_empty(&self) -> bool {
        self.left.is_none()
            && self.right.is_none()
            && self.top.is_none()
            && self.bottom.is_none()
            && self.diagonal.is_none()
            && self.diagonal_up.is_none()
            && self.diagonal_down.is_none()
    }
}

impl IsEmpty for AlignmentDescriptor {
    fn is_empty(&self) -> bool {
        self.horizontal.is_none()
            && self.vertical.is_none()
            && self.wrap_text.is_none()
            && self.text_rotation.is_none()
    }
}

impl IsEmpty for ProtectionDescriptor {
    fn is_empty(&self) -> bool {
        self.locked.is_none() && self.hidden.is_none()
    }
}

/// Builds the rust_xlsxwriter format equivalent to a descriptor.
pub fn format_from_descriptor(descriptor: &StyleDescriptor) -> Format {
    let mut format = Format::new();

    if let Some(font) = &descriptor.font {
        if let Some(name) = &font.name {
            format = format.set_font_name(name);
        }
        if let Some(size) = font.size {
            format = format.set_font_size(size);
        }
        if font.bold == Some(true) {
            format = format.set_bold();
        }
        if font.italic == Some(true) {
            format = format.set_italic();
        }
        if let Some(underline) = font.underline.as_deref().and_then(underline_from_name) {
            format = format.set_underline(underline);
        }
        if font.strikethrough == Some(true) {
            format = format.set_font_strikethrough();
        }
        if let Some(color) = font.color.as_deref().and_then(color_from_argb) {
            format = format.set_font_color(color);
        }
    }

    if let Some(fill) = &descriptor.fill {
        let pattern = fill
            .pattern_type
            .as_deref()
            .map(pattern_from_name)
            .unwrap_or(FormatPattern::None);
        format = format.set_pattern(pattern);
        let foreground = fill.foreground_color.as_deref().and_then(color_from_argb);
        let background = fill.background_color.as_deref().and_then(color_from_argb);
        if pattern == FormatPattern::Solid {
            // a solid cell colour lives in the file's fgColor slot
            if let Some(color) = foreground.or(background) {
                format = format.set_background_color(color);
            }
        } else {
            if let Some(color) = foreground {
                format = format.set_foreground_color(color);
            }
            if let Some(color) = background {
                format = format.set_background_color(color);
            }
        }
    }

    if let Some(borders) = &descriptor.borders {
        if let Some(side) = &borders.top {
            format = format.set_border_top(border_from_side(side));
            if let Some(color) = side.color.as_deref().and_then(color_from_argb) {
                format = format.set_border_top_color(color);
            }
        }
        if let Some(side) = &borders.bottom {
            format = format.set_border_bottom(border_from_side(side));
            if let Some(color) = side.color.as_deref().and_then(color_from_argb) {
                format = format.set_border_bottom_color(color);
            }
        }
        if let Some(side) = &borders.left {
            format = format.set_border_left(border_from_side(side));
            if let Some(color) = side.color.as_deref().and_then(color_from_argb) {
                format = format.set_border_left_color(color);
            }
        }
        if let Some(side) = &borders.right {
            format = format.set_border_right(border_from_side(side));
            if let Some(color) = side.color.as_deref().and_then(color_from_argb) {
                format = format.set_border_right_color(color);
            }
        }
        if let Some(side) = &borders.diagonal {
            format = format.set_border_diagonal(border_from_side(side));
            if let Some(color) = side.color.as_deref().and_then(color_from_argb) {
                format = format.set_border_diagonal_color(color);
            }
            let diagonal = match (borders.diagonal_up, borders.diagonal_down) {
                (Some(true), Some(true)) => FormatDiagonalBorder::BorderUpDown,
                (Some(true), _) => FormatDiagonalBorder::BorderUp,
                (_, Some(true)) => FormatDiagonalBorder::BorderDown,
                _ => FormatDiagonalBorder::None,
            };
            format = format.set_border_diagonal_type(diagonal);
        }
    }

    if let Some(alignment) = &descriptor.alignment {
        if let Some(align) = alignment.horizontal.as_deref().and_then(horizontal_from_name) {
            format = format.set_align(align);
        }
        if let Some(align) = alignment.vertical.as_deref().and_then(vertical_from_name) {
            format = format.set_align(align);
        }
        if alignment.wrap_text == Some(true) {
            format = format.set_text_wrap();
        }
        if let Some(rotation) = alignment.text_rotation.and_then(rotation_from_excel) {
            format = format.set_rotation(rotation);
        }
    }

    if let Some(code) = &descriptor.number_format {
        format = format.set_num_format(code);
    }

    if let Some(protection) = &descriptor.protection {
        if protection.locked == Some(false) {
            format = format.set_unlocked();
        }
        if protection.hidden == Some(true) {
            format = format.set_hidden();
        }
    }

    format
}

/// `AARRGGBB` or `RRGGBB` to an RGB colour; alpha is dropped.
pub fn color_from_argb(argb: &str) -> Option<Color> {
    let hex = argb.trim().trim_start_matches('#');
    let rgb = match hex.len() {
        8 => &hex[2..],
        6 => hex,
        _ => return None,
    };
    u32::from_str_radix(rgb, 16).ok().map(Color::RGB)
}

fn underline_from_name(name: &str) -> Option<FormatUnderline> {
    match name {
        "single" => Some(FormatUnderline::Single),
        "double" => Some(FormatUnderline::Double),
        "singleAccounting" => Some(FormatUnderline::SingleAccounting),
        "doubleAccounting" => Some(FormatUnderline::DoubleAccounting),
        _ => None,
    }
}

fn pattern_from_name(name: &str) -> FormatPattern {
    match name {
        "solid" => FormatPattern::Solid,
        "mediumGray" => FormatPattern::MediumGray,
        "darkGray" => FormatPattern::DarkGray,
        "lightGray" => FormatPattern::LightGray,
        "darkHorizontal" => FormatPattern::DarkHorizontal,
        "darkVertical" => FormatPattern::DarkVertical,
        "darkDown" => FormatPattern::DarkDown,
        "darkUp" => FormatPattern::DarkUp,
        "darkGrid" => FormatPattern::DarkGrid,
        "darkTrellis" => FormatPattern::DarkTrellis,
        "lightHorizontal" => FormatPattern::LightHorizontal,
        "lightVertical" => FormatPattern::LightVertical,
        "lightDown" => FormatPattern::LightDown,
        "lightUp" => FormatPattern::LightUp,
        "lightGrid" => FormatPattern::LightGrid,
        "lightTrellis" => FormatPattern::LightTrellis,
        "gray125" => FormatPattern::Gray125,
        "gray0625" => FormatPattern::Gray0625,
        _ => FormatPattern::None,
    }
}

fn border_from_side(side: &BorderSideDescriptor) -> FormatBorder {
    match side.style.as_deref().unwrap_or("none") {
        "thin" => FormatBorder::Thin,
        "medium" => FormatBorder::Medium,
        "dashed" => FormatBorder::Dashed,
        "dotted" => FormatBorder::Dotted,
        "thick" => FormatBorder::Thick,
        "double" => FormatBorder::Double,
        "hair" => FormatBorder::Hair,
        "mediumDashed" => FormatBorder::MediumDashed,
        "dashDot" => FormatBorder::DashDot,
        "mediumDashDot" => FormatBorder::MediumDashDot,
        "dashDotDot" => FormatBorder::DashDotDot,
        "mediumDashDotDot" => FormatBorder::MediumDashDotDot,
        "slantDashDot" => FormatBorder::SlantDashDot,
        _ => FormatBorder::None,
    }
}

fn horizontal_from_name(name: &str) -> Option<FormatAlign> {
    match name {
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "fill" => Some(FormatAlign::Fill),
        "justify" => Some(FormatAlign::Justify),
        "centerContinuous" => Some(FormatAlign::CenterAcross),
        "distributed" => Some(FormatAlign::Distributed),
        _ => None,
    }
}

fn vertical_from_name(name: &str) -> Option<FormatAlign> {
    match name {
        "top" => Some(FormatAlign::Top),
        "center" => Some(FormatAlign::VerticalCenter),
        "bottom" => Some(FormatAlign::Bottom),
        "justify" => Some(FormatAlign::VerticalJustify),
        "distributed" => Some(FormatAlign::VerticalDistributed),
        _ => None,
    }
}

/// Excel stores downward angles as 91..=180 and stacked text as 255.
fn rotation_from_excel(rotation: u32) -> Option<i16> {
    match rotation {
        0..=90 => Some(rotation as i16),
        91..=180 => Some(-((rotation - 90) as i16)),
        255 => Some(270),
        _ => None,
    }
}
