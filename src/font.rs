use crate::error::LabelError;
use crate::types::Pt;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use std::collections::{BTreeMap, BTreeSet};
use ttf_parser::GlyphId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontProgramKind {
    TrueType,
    OpenTypeCff,
}

#[derive(Debug, Clone)]
pub(crate) struct FontMetrics {
    pub(crate) units_per_em: u16,
    pub(crate) ascent: i16,
    pub(crate) descent: i16,
    pub(crate) cap_height: i16,
    pub(crate) italic_angle: i16,
    pub(crate) stem_v: i16,
    pub(crate) bbox: (i16, i16, i16, i16),
    pub(crate) missing_width: u16,
    pub(crate) is_fixed_pitch: bool,
}

/// One positioned glyph of a shaped label. Advances are in 1/1000 em.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapedGlyph {
    pub glyph_id: u16,
    /// Advance after shaping (kerning and other positioning applied).
    pub advance: i32,
    /// Nominal `hmtx` advance, the width the embedded font declares for this glyph.
    pub nominal_advance: i32,
    /// Source text this glyph was shaped from; empty for glyphs that continue a cluster.
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlyphRun {
    pub glyphs: Vec<ShapedGlyph>,
}

impl GlyphRun {
    pub fn total_units(&self) -> i32 {
        self.glyphs
            .iter()
            .fold(0i32, |acc, glyph| acc.saturating_add(glyph.advance))
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Glyph id to source text, first occurrence wins.
    pub(crate) fn glyph_map(&self) -> BTreeMap<u16, String> {
        let mut map = BTreeMap::new();
        for glyph in &self.glyphs {
            if glyph.text.is_empty() {
                continue;
            }
            map.entry(glyph.glyph_id).or_insert_with(|| glyph.text.clone());
        }
        map
    }
}

/// A parsed, embeddable font program.
///
/// Immutable after [`FontResource::load`]; shared read-only by every
/// per-recipient stamping pass.
#[derive(Debug, Clone)]
pub struct FontResource {
    name: String,
    data: Vec<u8>,
    metrics: FontMetrics,
    program_kind: FontProgramKind,
}

impl FontResource {
    pub fn load(data: impl Into<Vec<u8>>) -> Result<Self, LabelError> {
        let data = data.into();
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|err| LabelError::FontParse(format!("invalid font program: {err}")))?;
        if HbFace::from_slice(&data, 0).is_none() {
            return Err(LabelError::FontParse(
                "font program cannot be prepared for shaping".to_string(),
            ));
        }
        let name = font_name(&face);
        let (metrics, program_kind) = FontMetrics::from_face(&face);
        log::debug!(
            "loaded font {} ({:?}, {} glyphs, {} units/em)",
            name,
            program_kind,
            face.number_of_glyphs(),
            metrics.units_per_em
        );
        Ok(Self {
            name,
            data,
            metrics,
            program_kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn program_kind(&self) -> FontProgramKind {
        self.program_kind
    }

    pub(crate) fn metrics(&self) -> &FontMetrics {
        &self.metrics
    }

    /// Width of `text` set at `font_size` points. Matches the width the
    /// stamped label occupies on the page.
    pub fn measure_width(&self, text: &str, font_size: f32) -> Pt {
        let run = self.shape(text);
        width_of_units(run.total_units(), font_size)
    }

    pub fn shape(&self, text: &str) -> GlyphRun {
        if text.is_empty() {
            return GlyphRun::default();
        }
        // Parsed once in `load`; cannot fail for the same bytes.
        let Some(face) = HbFace::from_slice(&self.data, 0) else {
            return GlyphRun::default();
        };
        let mut buffer = UnicodeBuffer::new();
        buffer.set_direction(detect_direction(text));
        buffer.push_str(text);
        let output = rustybuzz::shape(&face, &[], buffer);
        let infos = output.glyph_infos();
        let positions = output.glyph_positions();

        let mut starts: Vec<usize> = infos.iter().map(|g| g.cluster as usize).collect();
        starts.sort_unstable();
        starts.dedup();
        let mut seen = BTreeSet::new();

        let mut glyphs = Vec::with_capacity(infos.len());
        for (info, pos) in infos.iter().zip(positions.iter()) {
            let glyph_id = info.glyph_id as u16;
            let start = (info.cluster as usize).min(text.len());
            let end = starts
                .iter()
                .copied()
                .find(|&s| s > start)
                .unwrap_or(text.len())
                .min(text.len());
            // Only the first glyph of a cluster carries its text.
            let source = if seen.insert(start)
                && start < end
                && text.is_char_boundary(start)
                && text.is_char_boundary(end)
            {
                text[start..end].to_string()
            } else {
                String::new()
            };
            glyphs.push(ShapedGlyph {
                glyph_id,
                advance: self.scale_to_1000(pos.x_advance),
                nominal_advance: self.glyph_advance(glyph_id) as i32,
                text: source,
            });
        }
        GlyphRun { glyphs }
    }

    /// Nominal advance of a glyph in 1/1000 em.
    pub fn glyph_advance(&self, gid: u16) -> u16 {
        let Ok(face) = ttf_parser::Face::parse(&self.data, 0) else {
            return self.metrics.missing_width;
        };
        let Some(advance) = face.glyph_hor_advance(GlyphId(gid)) else {
            return self.metrics.missing_width;
        };
        let units = self.metrics.units_per_em.max(1) as i64;
        let scaled = ((advance as i64) * 1000 + (units / 2)) / units;
        scaled.clamp(0, u16::MAX as i64) as u16
    }

    fn scale_to_1000(&self, value: i32) -> i32 {
        let units = self.metrics.units_per_em.max(1) as i64;
        let value = value as i64 * 1000;
        let rounded = if value >= 0 {
            (value + units / 2) / units
        } else {
            -((-value + units / 2) / units)
        };
        rounded.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }
}

pub(crate) fn width_of_units(units: i32, font_size: f32) -> Pt {
    if units == 0 {
        return Pt::ZERO;
    }
    Pt::from_f32(font_size).mul_ratio(units, 1000)
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> (Self, FontProgramKind) {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;

        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);
        let missing_width = face
            .glyph_hor_advance(GlyphId(0))
            .map(|value| ((value as f32) * scale).round().clamp(0.0, u16::MAX as f32) as u16)
            .unwrap_or(0);

        let program_kind = if face.tables().cff.is_some() {
            FontProgramKind::OpenTypeCff
        } else {
            FontProgramKind::TrueType
        };

        (
            Self {
                units_per_em,
                ascent,
                descent,
                cap_height,
                italic_angle,
                stem_v: 80,
                bbox,
                missing_width,
                is_fixed_pitch: face.is_monospaced(),
            },
            program_kind,
        )
    }
}

fn detect_direction(text: &str) -> HbDirection {
    for ch in text.chars() {
        let code = ch as u32;
        let rtl = matches!(
            code,
            0x0590..=0x08FF
                | 0xFB1D..=0xFDFF
                | 0xFE70..=0xFEFF
                | 0x1EE00..=0x1EEFF
        );
        if rtl {
            return HbDirection::RightToLeft;
        }
    }
    HbDirection::LeftToRight
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn font_name(face: &ttf_parser::Face<'_>) -> String {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name);
                }
            }
            name_id::FULL_NAME => {
                if full.is_none() {
                    full = Some(name);
                }
            }
            name_id::POST_SCRIPT_NAME => {
                if post.is_none() {
                    post = Some(name);
                }
            }
            _ => {}
        }
    }

    post.or(full)
        .or(family)
        .unwrap_or_else(|| "LabelFont".to_string())
}
