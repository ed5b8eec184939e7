//! In-memory fixtures shared by the unit tests: a tiny TrueType font and
//! lopdf-built template documents.

use crate::font::FontResource;
use lopdf::{
    Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream,
    dictionary,
};

pub(crate) const FIXTURE_FONT_NAME: &str = "LabelFixture-Regular";

const FIRST_CODE: u32 = 0x20;
const LAST_CODE: u32 = 0x7E;

/// Advance in font units (1000 per em) of the fixture glyph for `code`.
pub(crate) fn fixture_advance(code: u32) -> u16 {
    match char::from_u32(code) {
        Some(' ') | Some('i') | Some('l') | Some('j') => 250,
        Some('W') | Some('M') => 900,
        _ => 500,
    }
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_i16(out: &mut Vec<u8>, v: i16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn head_table() -> Vec<u8> {
    let mut t = Vec::new();
    push_u32(&mut t, 0x0001_0000); // version
    push_u32(&mut t, 0x0001_0000); // font revision
    push_u32(&mut t, 0); // checksum adjustment
    push_u32(&mut t, 0x5F0F_3CF5); // magic
    push_u16(&mut t, 0); // flags
    push_u16(&mut t, 1000); // units per em
    t.extend_from_slice(&[0u8; 16]); // created, modified
    push_i16(&mut t, 0); // x min
    push_i16(&mut t, -200); // y min
    push_i16(&mut t, 1000); // x max
    push_i16(&mut t, 800); // y max
    push_u16(&mut t, 0); // mac style
    push_u16(&mut t, 8); // lowest rec ppem
    push_i16(&mut t, 2); // direction hint
    push_i16(&mut t, 0); // index to loc format
    push_i16(&mut t, 0); // glyph data format
    t
}

fn hhea_table(number_of_metrics: u16) -> Vec<u8> {
    let mut t = Vec::new();
    push_u32(&mut t, 0x0001_0000);
    push_i16(&mut t, 800); // ascender
    push_i16(&mut t, -200); // descender
    push_i16(&mut t, 0); // line gap
    push_u16(&mut t, 900); // advance width max
    push_i16(&mut t, 0); // min lsb
    push_i16(&mut t, 0); // min rsb
    push_i16(&mut t, 900); // x max extent
    push_i16(&mut t, 1); // caret slope rise
    push_i16(&mut t, 0); // caret slope run
    push_i16(&mut t, 0); // caret offset
    t.extend_from_slice(&[0u8; 8]); // reserved
    push_i16(&mut t, 0); // metric data format
    push_u16(&mut t, number_of_metrics);
    t
}

fn maxp_table(glyphs: u16) -> Vec<u8> {
    let mut t = Vec::new();
    push_u32(&mut t, 0x0000_5000);
    push_u16(&mut t, glyphs);
    t
}

fn hmtx_table() -> Vec<u8> {
    let mut t = Vec::new();
    // .notdef
    push_u16(&mut t, 500);
    push_i16(&mut t, 0);
    for code in FIRST_CODE..=LAST_CODE {
        push_u16(&mut t, fixture_advance(code));
        push_i16(&mut t, 0);
    }
    t
}

fn cmap_table() -> Vec<u8> {
    let mut t = Vec::new();
    push_u16(&mut t, 0); // version
    push_u16(&mut t, 1); // one encoding record
    push_u16(&mut t, 0); // platform: Unicode
    push_u16(&mut t, 4); // encoding: full repertoire
    push_u32(&mut t, 12); // subtable offset
    // Format 12, one sequential group.
    push_u16(&mut t, 12);
    push_u16(&mut t, 0);
    push_u32(&mut t, 16 + 12);
    push_u32(&mut t, 0); // language
    push_u32(&mut t, 1); // groups
    push_u32(&mut t, FIRST_CODE);
    push_u32(&mut t, LAST_CODE);
    push_u32(&mut t, 1); // first glyph id
    t
}

fn name_table() -> Vec<u8> {
    let name: Vec<u8> = FIXTURE_FONT_NAME
        .encode_utf16()
        .flat_map(|unit| unit.to_be_bytes())
        .collect();
    let mut t = Vec::new();
    push_u16(&mut t, 0); // format
    push_u16(&mut t, 1); // count
    push_u16(&mut t, 6 + 12); // string storage offset
    push_u16(&mut t, 3); // platform: Windows
    push_u16(&mut t, 1); // encoding: Unicode BMP
    push_u16(&mut t, 0x0409); // language: en-US
    push_u16(&mut t, 6); // name id: PostScript name
    push_u16(&mut t, name.len() as u16);
    push_u16(&mut t, 0);
    t.extend_from_slice(&name);
    t
}

/// Builds a minimal TrueType program: `.notdef` plus printable ASCII,
/// no outlines, metrics from [`fixture_advance`].
pub(crate) fn fixture_font_bytes() -> Vec<u8> {
    let glyphs = (LAST_CODE - FIRST_CODE + 2) as u16;
    // Table records must be sorted by tag.
    let tables: Vec<(&[u8; 4], Vec<u8>)> = vec![
        (b"cmap", cmap_table()),
        (b"head", head_table()),
        (b"hhea", hhea_table(glyphs)),
        (b"hmtx", hmtx_table()),
        (b"maxp", maxp_table(glyphs)),
        (b"name", name_table()),
    ];

    let mut out = Vec::new();
    push_u32(&mut out, 0x0001_0000);
    push_u16(&mut out, tables.len() as u16);
    push_u16(&mut out, 64); // search range
    push_u16(&mut out, 2); // entry selector
    push_u16(&mut out, (tables.len() as u16) * 16 - 64); // range shift

    let mut offset = 12 + 16 * tables.len();
    let mut body = Vec::new();
    for (tag, data) in &tables {
        out.extend_from_slice(*tag);
        push_u32(&mut out, 0); // checksum
        push_u32(&mut out, offset as u32);
        push_u32(&mut out, data.len() as u32);
        body.extend_from_slice(data);
        while body.len() % 4 != 0 {
            body.push(0);
        }
        offset = 12 + 16 * tables.len() + body.len();
    }
    out.extend_from_slice(&body);
    out
}

pub(crate) fn fixture_font() -> FontResource {
    FontResource::load(fixture_font_bytes()).expect("fixture font")
}

/// Template with one page per entry of `media_boxes`; each page draws its
/// marker text with a base-14 font.
pub(crate) fn template_pdf_with_boxes(media_boxes: &[[f32; 4]]) -> Vec<u8> {
    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids: Vec<LoObject> = Vec::new();
    for (index, media_box) in media_boxes.iter().enumerate() {
        let content = format!("BT /F1 18 Tf 72 720 Td (TEMPLATE PAGE {}) Tj ET", index + 1)
            .into_bytes();
        let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => media_box.iter().map(|v| LoObject::from(*v)).collect::<Vec<_>>(),
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    save(doc)
}

/// Letter-sized template with `pages` pages.
pub(crate) fn template_pdf(pages: usize) -> Vec<u8> {
    template_pdf_with_boxes(&vec![[0.0, 0.0, 612.0, 792.0]; pages])
}

/// Two-page template whose pages inherit `MediaBox` and `Resources` from the
/// page tree root.
pub(crate) fn template_pdf_inherited() -> Vec<u8> {
    let mut doc = LoDocument::with_version("1.4");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let mut kids: Vec<LoObject> = Vec::new();
    for index in 0..2 {
        let content = format!("BT /F1 10 Tf 50 50 Td (INHERITED {}) Tj ET", index + 1).into_bytes();
        let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => 2,
            "MediaBox" => vec![0.into(), 0.into(), 300.into(), 400.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    save(doc)
}

/// Letter template whose trailer carries a Standard security handler
/// `/Encrypt` entry, either as an indirect object or inline.
pub(crate) fn template_pdf_encrypted(indirect: bool) -> Vec<u8> {
    let mut doc = load(&template_pdf(1));
    let encrypt = dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "O" => LoObject::string_literal(vec![0u8; 32]),
        "U" => LoObject::string_literal(vec![0u8; 32]),
        "P" => -4,
    };
    if indirect {
        let encrypt_id = doc.add_object(encrypt);
        doc.trailer.set("Encrypt", encrypt_id);
    } else {
        doc.trailer.set("Encrypt", LoObject::Dictionary(encrypt));
    }
    save(doc)
}

/// Well-formed document whose page tree has no kids.
pub(crate) fn template_pdf_without_pages() -> Vec<u8> {
    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => Vec::<LoObject>::new(),
        "Count" => 0,
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    save(doc)
}

fn save(mut doc: LoDocument) -> Vec<u8> {
    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save fixture pdf");
    out
}

pub(crate) fn load(bytes: &[u8]) -> LoDocument {
    LoDocument::load_mem(bytes).expect("load pdf")
}

pub(crate) fn page_ids(doc: &LoDocument) -> Vec<LoObjectId> {
    doc.get_pages().values().copied().collect()
}

/// Concatenated, decoded content of one page.
pub(crate) fn page_content(doc: &LoDocument, page_id: LoObjectId) -> String {
    let bytes = doc.get_page_content(page_id).expect("page content");
    String::from_utf8_lossy(&bytes).into_owned()
}

/// The hex glyph string the stamper writes for `name` with the fixture font.
pub(crate) fn label_hex(font: &FontResource, name: &str) -> String {
    let run = font.shape(name);
    let mut out = String::new();
    for glyph in &run.glyphs {
        out.push_str(&format!("{:04X}", glyph.glyph_id));
    }
    out
}

pub(crate) fn count_token(haystack: &str, token: &str) -> usize {
    if token.is_empty() {
        return 0;
    }
    haystack.matches(token).count()
}
