//! Per-meeting PDF consolidation.
//!
//! Documents for the same city and meeting date are grouped in the order
//! they were processed, then concatenated page by page into a single
//! combined PDF on the city's mount point.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, info, instrument};

use flexdocs_shared::{ConsolidatedOutput, FlexDocsError, Result, slugify};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic `Parent` chains in malformed files.
const MAX_TREE_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// All documents of one meeting, in merge order.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationGroup {
    pub city: String,
    pub meeting_date: NaiveDate,
    /// Mount point receiving the combined file.
    pub output_dir: PathBuf,
    /// Local member files; no path appears twice.
    pub member_documents: Vec<PathBuf>,
}

impl ConsolidationGroup {
    /// `<city-slug>_<YYYY-MM-DD>_combined.pdf`
    pub fn output_file_name(&self) -> String {
        format!("{}_{}_combined.pdf", slugify(&self.city), self.meeting_date)
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(self.output_file_name())
    }
}

/// One processed document as seen by the consolidator.
#[derive(Debug, Clone)]
pub struct GroupMember {
    pub city: String,
    pub meeting_date: NaiveDate,
    pub output_dir: PathBuf,
    pub path: PathBuf,
}

/// Group members by (city, meeting date).
///
/// Groups appear in first-seen order and members keep their input order.
/// A path listed twice is the same local file and is merged once; staged
/// downloads carry a per-URL name, so distinct documents never share a path.
pub fn group_by_meeting(members: impl IntoIterator<Item = GroupMember>) -> Vec<ConsolidationGroup> {
    let mut groups: Vec<ConsolidationGroup> = Vec::new();

    for member in members {
        let existing = groups
            .iter_mut()
            .find(|g| g.city == member.city && g.meeting_date == member.meeting_date);

        match existing {
            Some(group) => {
                if !group.member_documents.contains(&member.path) {
                    group.member_documents.push(member.path);
                }
            }
            None => groups.push(ConsolidationGroup {
                city: member.city,
                meeting_date: member.meeting_date,
                output_dir: member.output_dir,
                member_documents: vec![member.path],
            }),
        }
    }

    groups
}

// ---------------------------------------------------------------------------
// Consolidation
// ---------------------------------------------------------------------------

/// Write the combined file for `group`.
///
/// A single member is copied unchanged; several are merged in order.
/// There is no cleanup if the write fails half way.
#[instrument(skip_all, fields(city = %group.city, date = %group.meeting_date, members = group.member_documents.len()))]
pub fn consolidate(group: &ConsolidationGroup, dry_run: bool) -> Result<ConsolidatedOutput> {
    let output = group.output_path();
    let merged = group.member_documents.len() > 1;

    if group.member_documents.is_empty() {
        return Err(FlexDocsError::validation(format!(
            "consolidation group {} has no members",
            group.output_file_name()
        )));
    }

    if dry_run {
        debug!(output = %output.display(), "dry run, skipping consolidation");
    } else {
        std::fs::create_dir_all(&group.output_dir)
            .map_err(|e| FlexDocsError::io(&group.output_dir, e))?;

        if merged {
            merge_pdfs(&group.member_documents, &output)?;
        } else {
            let single = &group.member_documents[0];
            std::fs::copy(single, &output).map_err(|e| FlexDocsError::io(single, e))?;
        }
        info!(output = %output.display(), merged, "consolidated file written");
    }

    Ok(ConsolidatedOutput {
        city: group.city.clone(),
        meeting_date: group.meeting_date,
        members: group.member_documents.clone(),
        output,
        merged,
    })
}

/// Concatenate the pages of `inputs`, in order, into a new PDF at `output`.
pub fn merge_pdfs(inputs: &[PathBuf], output: &Path) -> Result<()> {
    let mut merged = Document::with_version("1.5");
    let mut next_id = 1;
    let mut page_ids: Vec<ObjectId> = Vec::new();

    for path in inputs {
        let mut doc = Document::load(path)
            .map_err(|e| FlexDocsError::Pdf(format!("failed to load {}: {e}", path.display())))?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for &page_id in &pages {
            flatten_inherited_attributes(&mut doc, page_id);
        }

        for (id, object) in std::mem::take(&mut doc.objects) {
            match type_name(&object) {
                Some(b"Catalog" | b"Pages" | b"Outlines" | b"Outline") => {}
                _ => {
                    merged.objects.insert(id, object);
                }
            }
        }

        debug!(path = %path.display(), pages = pages.len(), "pages collected");
        page_ids.extend(pages);
    }

    if page_ids.is_empty() {
        return Err(FlexDocsError::Pdf("no pages found in merge inputs".into()));
    }

    let pages_id: ObjectId = (next_id, 0);
    let catalog_id: ObjectId = (next_id + 1, 0);

    for page_id in &page_ids {
        if let Ok(Object::Dictionary(page)) = merged.get_object_mut(*page_id) {
            page.set("Parent", Object::Reference(pages_id));
        }
    }

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(page_ids.len() as i64));
    pages.set(
        "Kids",
        Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
    );
    merged.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    merged.objects.insert(catalog_id, Object::Dictionary(catalog));

    merged.trailer.set("Root", Object::Reference(catalog_id));
    merged.max_id = catalog_id.0;
    merged.renumber_objects();
    merged.compress();

    merged
        .save(output)
        .map_err(|e| FlexDocsError::Pdf(format!("failed to write {}: {e}", output.display())))?;
    Ok(())
}

/// The `/Type` name of a dictionary object, if any.
fn type_name(object: &Object) -> Option<&[u8]> {
    object.as_dict().ok()?.get(b"Type").ok()?.as_name().ok()
}

/// Copy attributes a page inherits from its page-tree ancestors onto the page.
///
/// The ancestors are dropped during a merge, so anything not copied would be lost.
fn flatten_inherited_attributes(doc: &mut Document, page_id: ObjectId) {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return;
    };

    let mut missing: Vec<&[u8]> = INHERITABLE_KEYS
        .iter()
        .copied()
        .filter(|key| !page.has(key))
        .collect();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut inherited: Vec<(Vec<u8>, Object)> = Vec::new();

    for _ in 0..MAX_TREE_DEPTH {
        let Some(parent_id) = parent else { break };
        if missing.is_empty() {
            break;
        }
        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };
        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                inherited.push((key.to_vec(), value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    if let Ok(page) = doc.get_dictionary_mut(page_id) {
        for (key, value) in inherited {
            page.set(key, value);
        }
    }
}
