use crate::font::{FontProgramKind, FontResource, GlyphRun};
use lopdf::{
    Dictionary as LoDictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId,
    Stream as LoStream, dictionary,
};
use std::collections::BTreeMap;

/// Adds a composite (Type0, Identity-H) font to `doc` covering the glyphs of
/// `run` and returns the id of the Type0 font dictionary.
///
/// The whole font program is embedded. Glyph codes in content streams are
/// raw glyph ids (CIDToGIDMap /Identity), so the `W` widths below are the
/// only widths a viewer applies.
pub(crate) fn embed_label_font(
    doc: &mut LoDocument,
    font: &FontResource,
    run: &GlyphRun,
) -> LoObjectId {
    let base = sanitize_font_name(font.name());

    let font_file_id = doc.add_object(font_file_stream(font));
    let descriptor_id = doc.add_object(font_descriptor(font, &base, font_file_id));

    let mut widths: BTreeMap<u16, i32> = BTreeMap::new();
    for glyph in &run.glyphs {
        widths.entry(glyph.glyph_id).or_insert(glyph.nominal_advance);
    }

    let subtype = match font.program_kind() {
        FontProgramKind::TrueType => "CIDFontType2",
        FontProgramKind::OpenTypeCff => "CIDFontType0",
    };
    let mut cid_font = dictionary! {
        "Type" => "Font",
        "Subtype" => subtype,
        "BaseFont" => base.as_str(),
        "CIDSystemInfo" => dictionary! {
            "Registry" => LoObject::string_literal("Adobe"),
            "Ordering" => LoObject::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => font.metrics().missing_width as i64,
    };
    if !widths.is_empty() {
        cid_font.set("W", w_array(&widths));
    }
    if font.program_kind() == FontProgramKind::TrueType {
        cid_font.set("CIDToGIDMap", "Identity");
    }
    let cid_font_id = doc.add_object(cid_font);

    let to_unicode = to_unicode_cmap(&run.glyph_map());
    let to_unicode_id = doc.add_object(LoStream::new(dictionary! {}, to_unicode.into_bytes()));

    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => base.as_str(),
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![cid_font_id.into()],
        "ToUnicode" => to_unicode_id,
    })
}

fn font_file_stream(font: &FontResource) -> LoStream {
    let mut dict = LoDictionary::new();
    match font.program_kind() {
        FontProgramKind::TrueType => {
            dict.set("Length1", font.data().len() as i64);
        }
        FontProgramKind::OpenTypeCff => {
            dict.set("Subtype", "OpenType");
        }
    }
    LoStream::new(dict, font.data().to_vec())
}

fn font_descriptor(font: &FontResource, base: &str, font_file_id: LoObjectId) -> LoDictionary {
    let metrics = font.metrics();
    // Symbolic: the label font is addressed by glyph id, not a standard encoding.
    let mut flags = 4i64;
    if metrics.is_fixed_pitch {
        flags |= 1;
    }
    let font_file_key = match font.program_kind() {
        FontProgramKind::TrueType => "FontFile2",
        FontProgramKind::OpenTypeCff => "FontFile3",
    };
    let mut dict = dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => base,
        "Flags" => flags,
        "FontBBox" => vec![
            (metrics.bbox.0 as i64).into(),
            (metrics.bbox.1 as i64).into(),
            (metrics.bbox.2 as i64).into(),
            (metrics.bbox.3 as i64).into(),
        ],
        "ItalicAngle" => metrics.italic_angle as i64,
        "Ascent" => metrics.ascent as i64,
        "Descent" => metrics.descent as i64,
        "CapHeight" => metrics.cap_height as i64,
        "StemV" => metrics.stem_v as i64,
        "MissingWidth" => metrics.missing_width as i64,
    };
    dict.set(font_file_key, font_file_id);
    dict
}

/// `W` entries grouped into runs of consecutive glyph ids: `c [w1 w2 ...]`.
fn w_array(widths: &BTreeMap<u16, i32>) -> Vec<LoObject> {
    let mut out: Vec<LoObject> = Vec::new();
    let mut run_start: Option<u16> = None;
    let mut previous = 0u16;
    let mut run_widths: Vec<LoObject> = Vec::new();
    for (&gid, &width) in widths {
        match run_start {
            Some(_) if gid == previous.wrapping_add(1) => {}
            Some(start) => {
                out.push((start as i64).into());
                out.push(LoObject::Array(std::mem::take(&mut run_widths)));
                run_start = Some(gid);
            }
            None => run_start = Some(gid),
        }
        run_widths.push((width as i64).into());
        previous = gid;
    }
    if let Some(start) = run_start {
        out.push((start as i64).into());
        out.push(LoObject::Array(run_widths));
    }
    out
}

pub(crate) fn sanitize_font_name(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if ch == ' ' {
            out.push('-');
        }
    }
    if out.is_empty() {
        "LabelFont".to_string()
    } else {
        out
    }
}

pub(crate) fn to_unicode_cmap(glyph_map: &BTreeMap<u16, String>) -> String {
    let entries: Vec<(u16, &str)> = glyph_map.iter().map(|(g, s)| (*g, s.as_str())).collect();

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    // At most 100 entries per bfchar block.
    for chunk in entries.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, text) in chunk {
            let mut uni = String::new();
            for unit in text.encode_utf16() {
                uni.push_str(&format!("{:04X}", unit));
            }
            out.push_str(&format!("<{:04X}> <{}>\n", gid, uni));
        }
        out.push_str("endbfchar\n");
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FIXTURE_FONT_NAME, fixture_font};

    #[test]
    fn to_unicode_cmap_handles_surrogates() {
        let mut map = BTreeMap::new();
        map.insert(3u16, "A".to_string());
        map.insert(4u16, "\u{1F600}".to_string());
        let cmap = to_unicode_cmap(&map);
        assert!(cmap.contains("2 beginbfchar"));
        assert!(cmap.contains("<0003> <0041>"));
        assert!(cmap.contains("<0004> <D83DDE00>"));
    }

    #[test]
    fn to_unicode_cmap_without_glyphs_has_no_bfchar_block() {
        let cmap = to_unicode_cmap(&BTreeMap::new());
        assert!(!cmap.contains("beginbfchar"));
        assert!(cmap.contains("endcmap"));
    }

    #[test]
    fn sanitize_font_name_keeps_pdf_name_chars() {
        assert_eq!(sanitize_font_name("Nanum Gothic Coding"), "Nanum-Gothic-Coding");
        assert_eq!(sanitize_font_name("a/b(c)"), "abc");
        assert_eq!(sanitize_font_name("()"), "LabelFont");
    }

    #[test]
    fn w_array_groups_consecutive_glyphs() {
        let widths: BTreeMap<u16, i32> = [(3, 500), (4, 250), (9, 900)].into_iter().collect();
        let w = w_array(&widths);
        assert_eq!(w.len(), 4);
        assert_eq!(w[0].as_i64().expect("start"), 3);
        let first: Vec<i64> = w[1]
            .as_array()
            .expect("widths")
            .iter()
            .map(|v| v.as_i64().expect("width"))
            .collect();
        assert_eq!(first, vec![500, 250]);
        assert_eq!(w[2].as_i64().expect("start"), 9);
        assert_eq!(w[3].as_array().expect("widths").len(), 1);
    }

    #[test]
    fn embed_builds_type0_font_graph() {
        let font = fixture_font();
        let run = font.shape("Ali");
        let mut doc = LoDocument::with_version("1.7");
        let font_id = embed_label_font(&mut doc, &font, &run);

        let type0 = doc.get_dictionary(font_id).expect("type0");
        assert_eq!(type0.get(b"Subtype").and_then(LoObject::as_name).expect("subtype"), b"Type0");
        assert_eq!(
            type0.get(b"Encoding").and_then(LoObject::as_name).expect("encoding"),
            b"Identity-H"
        );
        assert_eq!(
            type0.get(b"BaseFont").and_then(LoObject::as_name).expect("base"),
            FIXTURE_FONT_NAME.as_bytes()
        );

        let descendants = type0
            .get(b"DescendantFonts")
            .and_then(LoObject::as_array)
            .expect("descendants");
        let cid_id = descendants[0].as_reference().expect("cid ref");
        let cid = doc.get_dictionary(cid_id).expect("cid font");
        assert_eq!(
            cid.get(b"Subtype").and_then(LoObject::as_name).expect("subtype"),
            b"CIDFontType2"
        );
        assert!(cid.has(b"W"));

        let descriptor_id = cid
            .get(b"FontDescriptor")
            .and_then(LoObject::as_reference)
            .expect("descriptor");
        let descriptor = doc.get_dictionary(descriptor_id).expect("descriptor dict");
        let file_id = descriptor
            .get(b"FontFile2")
            .and_then(LoObject::as_reference)
            .expect("font file");
        let file = doc.get_object(file_id).and_then(LoObject::as_stream).expect("font stream");
        assert_eq!(file.content, font.data());

        let to_unicode_id = type0
            .get(b"ToUnicode")
            .and_then(LoObject::as_reference)
            .expect("to unicode");
        let cmap = doc.get_object(to_unicode_id).and_then(LoObject::as_stream).expect("cmap");
        let cmap = String::from_utf8_lossy(&cmap.content).into_owned();
        assert!(cmap.contains("3 beginbfchar"));
    }
}
