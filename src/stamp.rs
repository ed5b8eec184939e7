use crate::embed::embed_label_font;
use crate::error::LabelError;
use crate::font::{FontResource, GlyphRun, width_of_units};
use crate::template::{WorkingCopy, inherited_attribute, resolve};
use crate::types::{Color, PageBox, Pt};
use lopdf::{
    Dictionary as LoDictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId,
    Stream as LoStream, dictionary,
};

pub const LABEL_FONT_SIZE: f32 = 12.0;
pub const LABEL_RIGHT_MARGIN: f32 = 16.0;
pub const LABEL_TOP_OFFSET: f32 = 24.0;

const FONT_KEY_PREFIX: &str = "NL";

/// Where a label landed on one page. `x`/`y` are the text origin (left end
/// of the baseline) in default user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelPlacement {
    pub page_index: usize,
    pub x: Pt,
    pub y: Pt,
    pub text_width: Pt,
    pub page_box: PageBox,
}

impl LabelPlacement {
    /// True when the name is wider than the page allows and the label
    /// starts at a negative x.
    pub fn overflows_left(&self) -> bool {
        self.x < Pt::ZERO
    }
}

/// Right-aligned label origin for a page: `width - text_width - 16`,
/// `height - 24`. The MediaBox origin is not added.
pub fn label_origin(page_box: PageBox, text_width: Pt) -> (Pt, Pt) {
    let x = page_box.width - text_width - Pt::from_f32(LABEL_RIGHT_MARGIN);
    let y = page_box.height - Pt::from_f32(LABEL_TOP_OFFSET);
    (x, y)
}

/// Draws a recipient's name in the top-right corner of every page of a
/// working copy.
#[derive(Debug, Clone, Copy)]
pub struct PageStamper<'a> {
    font: &'a FontResource,
    color: Color,
}

fn lopdf_err(err: lopdf::Error) -> LabelError {
    LabelError::stamp(format!("pdf object error: {err}"))
}

impl<'a> PageStamper<'a> {
    pub fn new(font: &'a FontResource) -> Self {
        Self {
            font,
            color: Color::BLACK,
        }
    }

    pub fn stamp(
        &self,
        copy: &mut WorkingCopy,
        name: &str,
    ) -> Result<Vec<LabelPlacement>, LabelError> {
        let run = self.font.shape(name);
        let text_width = width_of_units(run.total_units(), LABEL_FONT_SIZE);
        let font_id = embed_label_font(copy.document_mut(), self.font, &run);
        let text_ops = tj_operand(&run);

        let mut placements = Vec::with_capacity(copy.page_count());
        for page_index in 0..copy.page_count() {
            let (Some(page_id), Some(page_box)) =
                (copy.page_id(page_index), copy.page_box(page_index))
            else {
                return Err(LabelError::stamp(format!(
                    "page {} missing from working copy",
                    page_index + 1
                )));
            };
            let (x, y) = label_origin(page_box, text_width);
            let placement = LabelPlacement {
                page_index,
                x,
                y,
                text_width,
                page_box,
            };
            if placement.overflows_left() {
                log::warn!(
                    "label {:?} is wider than page {} allows; it starts at x={}",
                    name,
                    page_index + 1,
                    x.to_pdf_number()
                );
            }

            let doc = copy.document_mut();
            let font_key = attach_font(doc, page_id, font_id)?;
            let label = format!(
                "BT\n/{} {} Tf\n{}\n{} {} Td\n{}\nET\n",
                font_key,
                Pt::from_f32(LABEL_FONT_SIZE).to_pdf_number(),
                self.color.to_pdf_fill(),
                x.to_pdf_number(),
                y.to_pdf_number(),
                text_ops
            );
            wrap_page_contents(doc, page_id, label.into_bytes())?;
            placements.push(placement);
        }

        log::debug!(
            "stamped {:?} on {} pages (width {} pt)",
            name,
            placements.len(),
            text_width.to_pdf_number()
        );
        Ok(placements)
    }
}

/// Text-showing operator for a shaped run. Glyph ids are written as
/// Identity-H codes; where shaping moved a glyph away from its nominal
/// advance, a TJ adjustment restores the shaped position.
fn tj_operand(run: &GlyphRun) -> String {
    if run.is_empty() {
        return "<> Tj".to_string();
    }
    let mut out = String::from("[<");
    for glyph in &run.glyphs {
        out.push_str(&format!("{:04X}", glyph.glyph_id));
        let adjust = glyph.nominal_advance - glyph.advance;
        if adjust != 0 {
            out.push_str(&format!(">{}<", adjust));
        }
    }
    out.push_str(">] TJ");
    out.replace("<>", "")
}

/// Gives the page its own `Resources` dictionary (resolving references and
/// inheritance) and registers `font_id` under a key no existing font uses.
fn attach_font(
    doc: &mut LoDocument,
    page_id: LoObjectId,
    font_id: LoObjectId,
) -> Result<String, LabelError> {
    let mut resources = match inherited_attribute(doc, page_id, b"Resources") {
        Some(value) => match resolve(doc, &value) {
            Some(LoObject::Dictionary(dict)) => dict.clone(),
            _ => LoDictionary::new(),
        },
        None => LoDictionary::new(),
    };
    let mut fonts = match resources.get(b"Font") {
        Ok(value) => match resolve(doc, value) {
            Some(LoObject::Dictionary(dict)) => dict.clone(),
            _ => LoDictionary::new(),
        },
        Err(_) => LoDictionary::new(),
    };

    let mut n = 1usize;
    let key = loop {
        let candidate = format!("{FONT_KEY_PREFIX}{n}");
        if !fonts.has(candidate.as_bytes()) {
            break candidate;
        }
        n += 1;
    };
    fonts.set(key.as_bytes().to_vec(), LoObject::Reference(font_id));
    resources.set("Font", LoObject::Dictionary(fonts));

    let page = doc
        .get_object_mut(page_id)
        .and_then(LoObject::as_dict_mut)
        .map_err(lopdf_err)?;
    page.set("Resources", LoObject::Dictionary(resources));
    Ok(key)
}

/// Brackets the existing content in `q`/`Q` and appends `label` after it,
/// so template graphics state cannot leak into the label.
fn wrap_page_contents(
    doc: &mut LoDocument,
    page_id: LoObjectId,
    label: Vec<u8>,
) -> Result<(), LabelError> {
    let existing: Vec<LoObject> = {
        let page = doc
            .get_object(page_id)
            .and_then(LoObject::as_dict)
            .map_err(lopdf_err)?;
        match page.get(b"Contents") {
            Ok(LoObject::Reference(id)) => match doc.get_object(*id) {
                Ok(LoObject::Array(items)) => items.clone(),
                Ok(LoObject::Stream(_)) => vec![LoObject::Reference(*id)],
                _ => Vec::new(),
            },
            Ok(LoObject::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    };

    let open_id = doc.add_object(LoStream::new(dictionary! {}, b"q\n".to_vec()));
    let mut tail = b"\nQ\n".to_vec();
    tail.extend_from_slice(&label);
    let label_id = doc.add_object(LoStream::new(dictionary! {}, tail));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(LoObject::Reference(open_id));
    contents.extend(existing);
    contents.push(LoObject::Reference(label_id));

    let page = doc
        .get_object_mut(page_id)
        .and_then(LoObject::as_dict_mut)
        .map_err(lopdf_err)?;
    page.set("Contents", LoObject::Array(contents));
    Ok(())
}
