//! PDF inspection helpers for tests

use lopdf::content::Content;
use lopdf::{Document, ObjectId};

pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

/// Every string shown with `Tj` on a page, in drawing order
pub fn page_texts(doc: &Document, page: ObjectId) -> Vec<String> {
    let content = Content::decode(&doc.get_page_content(page).unwrap()).unwrap();
    content
        .operations
        .iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| op.operands.first())
        .filter_map(|operand| operand.as_str().ok())
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .collect()
}

/// Pixel width of the image drawn on a page, if any
pub fn page_image_width(doc: &Document, page: ObjectId) -> Option<i64> {
    let page = doc.get_dictionary(page).ok()?;
    let resources = page.get(b"Resources").ok()?.as_dict().ok()?;
    let xobjects = resources.get(b"XObject").ok()?.as_dict().ok()?;
    let (_, image) = xobjects.iter().next()?;
    let stream = doc.get_object(image.as_reference().ok()?).ok()?.as_stream().ok()?;
    stream.dict.get(b"Width").ok()?.as_i64().ok()
}
