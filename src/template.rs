use crate::error::LabelError;
use crate::types::{PageBox, Size};
use lopdf::{Document as LoDocument, Object as LoObject, ObjectId as LoObjectId};
use sha2::{Digest, Sha256};

/// Page attributes a page may inherit from its ancestors in the page tree.
pub(crate) const INHERITABLE_PAGE_KEYS: [&[u8]; 4] =
    [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

const MAX_PAGE_TREE_DEPTH: usize = 64;

/// The parsed source template. Never mutated; every recipient works on a
/// [`WorkingCopy`] obtained from [`TemplateDocument::clone_working_copy`].
#[derive(Debug, Clone)]
pub struct TemplateDocument {
    document: LoDocument,
    page_ids: Vec<LoObjectId>,
    page_boxes: Vec<PageBox>,
    fingerprint: String,
}

/// An independent, mutable copy of the template scoped to one recipient.
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    document: LoDocument,
    page_ids: Vec<LoObjectId>,
    page_boxes: Vec<PageBox>,
}

fn template_err(message: impl Into<String>) -> LabelError {
    LabelError::TemplateParse(message.into())
}

impl TemplateDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self, LabelError> {
        let document = LoDocument::load_mem(bytes).map_err(|err| template_err(err.to_string()))?;
        // `is_encrypted` only sees an indirect `/Encrypt`; an inline
        // dictionary encrypts the file just the same.
        if document.is_encrypted() || document.trailer.has(b"Encrypt") {
            return Err(template_err("template PDF is encrypted"));
        }
        let page_ids: Vec<LoObjectId> = document.get_pages().values().copied().collect();
        if page_ids.is_empty() {
            return Err(template_err("template PDF has no pages"));
        }

        let mut page_boxes = Vec::with_capacity(page_ids.len());
        for (index, page_id) in page_ids.iter().enumerate() {
            let page_box = match media_box(&document, *page_id)? {
                Some(page_box) => page_box,
                None => {
                    log::warn!(
                        "template page {} has no usable MediaBox; assuming Letter",
                        index + 1
                    );
                    PageBox::from(Size::letter())
                }
            };
            page_boxes.push(page_box);
        }

        let fingerprint = Sha256::digest(bytes)
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();

        log::debug!(
            "parsed template: version {}, {} pages, sha256 {}",
            document.version,
            page_ids.len(),
            fingerprint
        );

        Ok(Self {
            document,
            page_ids,
            page_boxes,
            fingerprint,
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    pub fn page_size(&self, index: usize) -> Option<Size> {
        self.page_boxes.get(index).map(PageBox::size)
    }

    pub fn page_box(&self, index: usize) -> Option<PageBox> {
        self.page_boxes.get(index).copied()
    }

    /// Hex SHA-256 of the template bytes.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Deep copy of the whole object graph; object ids are preserved, no
    /// state is shared with the template or with other copies.
    pub fn clone_working_copy(&self) -> WorkingCopy {
        WorkingCopy {
            document: self.document.clone(),
            page_ids: self.page_ids.clone(),
            page_boxes: self.page_boxes.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn document(&self) -> &LoDocument {
        &self.document
    }
}

impl WorkingCopy {
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    pub fn page_size(&self, index: usize) -> Option<Size> {
        self.page_boxes.get(index).map(PageBox::size)
    }

    pub fn page_box(&self, index: usize) -> Option<PageBox> {
        self.page_boxes.get(index).copied()
    }

    pub(crate) fn page_id(&self, index: usize) -> Option<LoObjectId> {
        self.page_ids.get(index).copied()
    }

    pub(crate) fn document(&self) -> &LoDocument {
        &self.document
    }

    pub(crate) fn document_mut(&mut self) -> &mut LoDocument {
        &mut self.document
    }
}

/// Looks `key` up on the page, then on each ancestor `Pages` node.
pub(crate) fn inherited_attribute(
    doc: &LoDocument,
    page_id: LoObjectId,
    key: &[u8],
) -> Option<LoObject> {
    let mut current = page_id;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        let dict = doc.get_object(current).and_then(LoObject::as_dict).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(LoObject::as_reference).ok()?;
    }
    None
}

pub(crate) fn resolve<'a>(doc: &'a LoDocument, object: &'a LoObject) -> Option<&'a LoObject> {
    match object {
        LoObject::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub(crate) fn number(object: &LoObject) -> Option<f32> {
    match object {
        LoObject::Integer(value) => Some(*value as f32),
        LoObject::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn media_box(doc: &LoDocument, page_id: LoObjectId) -> Result<Option<PageBox>, LabelError> {
    if doc.get_object(page_id).and_then(LoObject::as_dict).is_err() {
        return Err(template_err(format!(
            "page object {} {} is not a dictionary",
            page_id.0, page_id.1
        )));
    }
    let Some(value) = inherited_attribute(doc, page_id, b"MediaBox") else {
        return Ok(None);
    };
    let Some(LoObject::Array(items)) = resolve(doc, &value) else {
        return Ok(None);
    };
    let coords: Vec<f32> = items
        .iter()
        .filter_map(|item| resolve(doc, item).and_then(number))
        .collect();
    if coords.len() != 4 {
        return Ok(None);
    }
    let page_box = PageBox::from_corners(coords[0], coords[1], coords[2], coords[3]);
    if page_box.width.to_milli_i64() <= 0 || page_box.height.to_milli_i64() <= 0 {
        return Ok(None);
    }
    Ok(Some(page_box))
}
