//! Keyword-based document classification.

use flexdocs_shared::{ClassifiedDocument, DocumentType, ScrapedDocument};

use crate::dates;

/// Ordered keyword table; the first keyword found wins.
///
/// `minute` also covers `minutes`.
const KEYWORDS: &[(&str, DocumentType)] = &[
    ("agenda", DocumentType::Agenda),
    ("minute", DocumentType::Minutes),
    ("packet", DocumentType::Packet),
];

/// Classify a document by case-insensitive substring match.
///
/// The whole keyword table is tried against the file name first; the URL is
/// only consulted when the file name matches nothing. Never fails;
/// unrecognised documents are [`DocumentType::Other`].
pub fn classify(file_name: &str, url: &str) -> DocumentType {
    keyword_label(file_name)
        .or_else(|| keyword_label(url))
        .unwrap_or(DocumentType::Other)
}

fn keyword_label(text: &str) -> Option<DocumentType> {
    let text = text.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(keyword, _)| text.contains(keyword))
        .map(|(_, label)| *label)
}

/// Classify a scraped record and attach its file name and meeting date.
pub fn classify_document(doc: &ScrapedDocument) -> ClassifiedDocument {
    let file_name = doc.file_name();
    let document_type = classify(&file_name, &doc.url);
    let meeting_date = dates::meeting_date(&file_name, &doc.url, doc.discovered_at);

    ClassifiedDocument {
        source: doc.clone(),
        document_type,
        file_name,
        meeting_date,
    }
}
