use crate::error::LabelError;
use crate::template::{INHERITABLE_PAGE_KEYS, WorkingCopy, inherited_attribute};
use lopdf::{
    Dictionary as LoDictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId,
    Stream as LoStream, dictionary,
};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

pub const DEFAULT_PDF_VERSION: &str = "1.7";
pub const DEFAULT_PRODUCER: &str = "pdf-labeler";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    pub version: String,
    pub compress: bool,
    /// Written to the Info dictionary; `None` omits the Info dictionary.
    pub producer: Option<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            version: DEFAULT_PDF_VERSION.to_string(),
            compress: true,
            producer: Some(DEFAULT_PRODUCER.to_string()),
        }
    }
}

type StreamDigest = [u8; 32];

/// Accumulates pages from any number of working copies into one output
/// document. Pages are appended in call order and copied eagerly, so a
/// source can be dropped or changed right after `append_pages` returns.
pub struct DocumentMerger {
    output: LoDocument,
    pages_id: LoObjectId,
    page_ids: Vec<LoObjectId>,
    streams: HashMap<StreamDigest, LoObjectId>,
    options: MergeOptions,
}

impl Default for DocumentMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentMerger {
    pub fn new() -> Self {
        Self::with_options(MergeOptions::default())
    }

    pub fn with_options(options: MergeOptions) -> Self {
        let mut output = LoDocument::with_version(options.version.as_str());
        let pages_id = output.new_object_id();
        Self {
            output,
            pages_id,
            page_ids: Vec::new(),
            streams: HashMap::new(),
            options,
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Copies pages `indices` of `source`, in the given order. Every index is
    /// checked first; on error nothing has been appended.
    pub fn append_pages(
        &mut self,
        source: &WorkingCopy,
        indices: &[usize],
    ) -> Result<(), LabelError> {
        let src = source.document();
        let mut pages = Vec::with_capacity(indices.len());
        for &index in indices {
            let page_id = source.page_id(index).ok_or_else(|| {
                LabelError::merge(format!(
                    "page index {index} out of range for a {}-page document",
                    source.page_count()
                ))
            })?;
            if src.get_object(page_id).and_then(LoObject::as_dict).is_err() {
                return Err(LabelError::merge(format!(
                    "page {} (object {} {}) is not a dictionary",
                    index + 1,
                    page_id.0,
                    page_id.1
                )));
            }
            pages.push(page_id);
        }

        let mut copier = GraphCopier {
            src,
            dst: &mut self.output,
            memo: HashMap::new(),
            pending: HashSet::new(),
            streams: &mut self.streams,
        };
        for page_id in pages {
            let new_id = copier.copy_page(page_id, self.pages_id);
            self.page_ids.push(new_id);
        }
        Ok(())
    }

    /// Builds the page tree, catalog and Info dictionary and serializes.
    pub fn finalize(mut self) -> Result<Vec<u8>, LabelError> {
        let kids: Vec<LoObject> = self.page_ids.iter().map(|id| LoObject::Reference(*id)).collect();
        let count = kids.len() as i64;
        self.output.objects.insert(
            self.pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.output.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.output.trailer.set("Root", catalog_id);
        if let Some(producer) = &self.options.producer {
            let info_id = self.output.add_object(dictionary! {
                "Producer" => LoObject::string_literal(producer.as_str()),
            });
            self.output.trailer.set("Info", info_id);
        }

        if self.options.compress {
            self.output.compress();
        }

        let mut bytes = Vec::new();
        self.output
            .save_to(&mut bytes)
            .map_err(|err| LabelError::Finalize(format!("failed to serialize output: {err}")))?;
        log::debug!(
            "serialized {} pages, {} objects, {} shared streams, {} bytes",
            self.page_ids.len(),
            self.output.objects.len(),
            self.streams.len(),
            bytes.len()
        );
        Ok(bytes)
    }
}

/// One `append_pages` call: source ids map to output ids through `memo`, so
/// objects shared between the appended pages are copied once.
struct GraphCopier<'a> {
    src: &'a LoDocument,
    dst: &'a mut LoDocument,
    memo: HashMap<LoObjectId, LoObjectId>,
    pending: HashSet<LoObjectId>,
    streams: &'a mut HashMap<StreamDigest, LoObjectId>,
}

impl<'a> GraphCopier<'a> {
    fn copy_page(&mut self, page_id: LoObjectId, parent_id: LoObjectId) -> LoObjectId {
        let src = self.src;
        let mut page = match src.get_object(page_id).and_then(LoObject::as_dict) {
            Ok(dict) => dict.clone(),
            Err(_) => LoDictionary::new(),
        };
        for key in INHERITABLE_PAGE_KEYS {
            if page.has(key) {
                continue;
            }
            if let Some(value) = inherited_attribute(src, page_id, key) {
                page.set(key.to_vec(), value);
            }
        }
        page.remove(b"Parent");

        // Registered before copying so back references (annotation /P) land
        // on the copy. Removed afterwards so the same page can be appended again.
        let new_id = self.dst.new_object_id();
        self.memo.insert(page_id, new_id);
        let mut copied = self.copy_dict(&page);
        copied.set("Parent", parent_id);
        self.dst.objects.insert(new_id, LoObject::Dictionary(copied));
        self.memo.remove(&page_id);
        new_id
    }

    fn copy_object(&mut self, object: &LoObject) -> LoObject {
        match object {
            LoObject::Reference(id) => match self.copy_reference(*id) {
                Some(new_id) => LoObject::Reference(new_id),
                None => LoObject::Null,
            },
            LoObject::Array(items) => {
                LoObject::Array(items.iter().map(|item| self.copy_object(item)).collect())
            }
            LoObject::Dictionary(dict) => LoObject::Dictionary(self.copy_dict(dict)),
            LoObject::Stream(stream) => {
                let dict = self.copy_dict(&stream.dict);
                let mut copied = LoStream::new(dict, stream.content.clone());
                copied.allows_compression = stream.allows_compression;
                LoObject::Stream(copied)
            }
            other => other.clone(),
        }
    }

    fn copy_dict(&mut self, dict: &LoDictionary) -> LoDictionary {
        let nested_page = dict
            .get(b"Type")
            .and_then(LoObject::as_name)
            .map(|name| name == b"Page")
            .unwrap_or(false);
        let mut out = LoDictionary::new();
        for (key, value) in dict.iter() {
            if nested_page && key.as_slice() == b"Parent" {
                continue;
            }
            let value = self.copy_object(value);
            out.set(key.clone(), value);
        }
        out
    }

    /// `None` for a reference to a missing object.
    fn copy_reference(&mut self, id: LoObjectId) -> Option<LoObjectId> {
        if let Some(new_id) = self.memo.get(&id) {
            return Some(*new_id);
        }
        let src = self.src;
        let object = src.get_object(id).ok()?;
        match object {
            LoObject::Stream(stream) => {
                if !self.pending.insert(id) {
                    // Cycle back into a stream still being copied: pin its id.
                    let new_id = self.dst.new_object_id();
                    self.memo.insert(id, new_id);
                    return Some(new_id);
                }
                let mut source_dict = stream.dict.clone();
                source_dict.remove(b"Length");
                let dict = self.copy_dict(&source_dict);
                self.pending.remove(&id);
                let mut copied = LoStream::new(dict, stream.content.clone());
                copied.allows_compression = stream.allows_compression;

                if let Some(pinned) = self.memo.get(&id).copied() {
                    self.dst.objects.insert(pinned, LoObject::Stream(copied));
                    return Some(pinned);
                }
                let digest = stream_digest(&copied);
                let new_id = match self.streams.get(&digest) {
                    Some(existing) => *existing,
                    None => {
                        let new_id = self.dst.add_object(copied);
                        self.streams.insert(digest, new_id);
                        new_id
                    }
                };
                self.memo.insert(id, new_id);
                Some(new_id)
            }
            other => {
                let new_id = self.dst.new_object_id();
                self.memo.insert(id, new_id);
                let copied = self.copy_object(other);
                self.dst.objects.insert(new_id, copied);
                Some(new_id)
            }
        }
    }
}

fn stream_digest(stream: &LoStream) -> StreamDigest {
    let mut hasher = Sha256::new();
    hash_dict(&mut hasher, &stream.dict);
    hasher.update(b"stream");
    hasher.update((stream.content.len() as u64).to_le_bytes());
    hasher.update(&stream.content);
    hasher.finalize().into()
}

fn hash_dict(hasher: &mut Sha256, dict: &LoDictionary) {
    hasher.update(b"<<");
    for (key, value) in dict.iter() {
        if key.as_slice() == b"Length" {
            continue;
        }
        hasher.update((key.len() as u64).to_le_bytes());
        hasher.update(key);
        hash_object(hasher, value);
    }
    hasher.update(b">>");
}

fn hash_object(hasher: &mut Sha256, object: &LoObject) {
    match object {
        LoObject::Null => hasher.update(b"n"),
        LoObject::Boolean(value) => hasher.update(if *value { b"t" } else { b"f" }),
        LoObject::Integer(value) => {
            hasher.update(b"i");
            hasher.update(value.to_le_bytes());
        }
        LoObject::Real(value) => {
            hasher.update(b"r");
            hasher.update(value.to_le_bytes());
        }
        LoObject::Name(name) => {
            hasher.update(b"/");
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name);
        }
        LoObject::String(bytes, _) => {
            hasher.update(b"s");
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        LoObject::Array(items) => {
            hasher.update(b"[");
            for item in items {
                hash_object(hasher, item);
            }
            hasher.update(b"]");
        }
        LoObject::Dictionary(dict) => hash_dict(hasher, dict),
        LoObject::Stream(stream) => {
            hash_dict(hasher, &stream.dict);
            hasher.update(&stream.content);
        }
        LoObject::Reference((number, generation)) => {
            hasher.update(b"R");
            hasher.update(number.to_le_bytes());
            hasher.update(generation.to_le_bytes());
        }
    }
}
