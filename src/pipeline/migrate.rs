//! Migration orchestrator.
//!
//! Drives the whole run: parse the export, rebuild the hierarchy, resolve
//! the destination collection, then walk the forest parent-before-child
//! creating documents and uploading their attachments. Archive and
//! structure errors abort the run; per-document and per-attachment API
//! failures are recorded on the item's outcome and the run continues.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use crate::error::Result;
use crate::models::{
    AttachmentFailure, Config, DocumentOutcome, DocumentStatus, MigrationReport, MigrationStats,
};
use crate::services::archive::ExportArchive;
use crate::services::outline::OutlineApi;
use crate::services::transform::{resolve_attachment_urls, transform_content};
use crate::services::tree::{PageNode, build_tree};
use crate::utils::{format_bytes, mime_for_path};

/// Run one complete migration.
pub async fn run_migration<A: OutlineApi + Sync>(
    api: &A,
    config: &Config,
    zip_path: &Path,
    collection_id: Option<&str>,
) -> Result<MigrationReport> {
    let started_at = Utc::now();
    let deadline = config
        .migration
        .run_timeout_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    log::info!("Parsing Docmost export from {}", zip_path.display());
    let mut archive = ExportArchive::open(zip_path)?;
    let export = archive.parse()?;
    log::info!(
        "Found {} documents and {} attachments in space '{}'",
        export.pages.len(),
        export.attachments.len(),
        export.space_name
    );

    let nodes = build_tree(export.pages.clone())?;

    let collection = match collection_id {
        Some(id) => {
            let collection = api.get_collection(id).await?;
            log::info!("Using existing collection '{}'", collection.name);
            collection
        }
        None => {
            let collection = api
                .create_collection(
                    &export.space_name,
                    &config.migration.collection_description,
                    &config.migration.collection_color,
                )
                .await?;
            log::info!("Created collection '{}' ({})", collection.name, collection.id);
            collection
        }
    };

    let mut mapping: HashMap<String, String> = HashMap::new();
    let mut outcomes: Vec<DocumentOutcome> = Vec::with_capacity(nodes.len());
    let mut documents_created = 0usize;
    let mut attachments_uploaded = 0usize;
    let mut total_attachment_bytes = 0u64;

    for (index, node) in nodes.iter().enumerate() {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                log::warn!(
                    "Run deadline reached; skipping {} remaining documents",
                    nodes.len() - index
                );
                for remaining in &nodes[index..] {
                    outcomes.push(skipped_outcome(remaining));
                }
                break;
            }
        }

        let transformed = transform_content(&node.page.content);
        for warning in &transformed.warnings {
            log::warn!("{}: {}", node.page.source_id, warning);
        }

        let parent_destination = node.parent.as_ref().and_then(|p| mapping.get(p)).cloned();
        if node.parent.is_some() && parent_destination.is_none() {
            log::warn!(
                "{}: parent was not migrated; placing at collection root",
                node.page.source_id
            );
        }

        let document = match api
            .create_document(
                &node.page.title,
                &transformed.text,
                &collection.id,
                parent_destination.as_deref(),
            )
            .await
        {
            Ok(document) => document,
            Err(e) if !e.is_fatal() => {
                log::warn!("Failed to create {}: {}", node.page.source_id, e);
                outcomes.push(failed_outcome(node, e.to_string()));
                continue;
            }
            Err(e) => return Err(e),
        };
        mapping.insert(node.page.source_id.clone(), document.id.clone());
        documents_created += 1;
        log::debug!("Created {} as {}", node.page.source_id, document.id);

        let mut uploads: HashMap<String, (String, u64)> = HashMap::new();
        let mut failures: Vec<AttachmentFailure> = Vec::new();

        for ref_path in &transformed.attachment_refs {
            let Some(entry) = export.find_attachment(ref_path) else {
                log::warn!("{}: attachment {} not found in archive", node.page.source_id, ref_path);
                failures.push(AttachmentFailure {
                    path: ref_path.clone(),
                    reason: "not found in archive".to_string(),
                });
                continue;
            };

            let bytes = match archive.read_bytes(&entry.entry_name) {
                Ok(bytes) => bytes,
                Err(e) => {
                    failures.push(AttachmentFailure {
                        path: ref_path.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            // Upload under the name the markdown reference uses; the uuid
            // fallback may have matched a differently named archive entry.
            let name = ref_path
                .rsplit('/')
                .next()
                .unwrap_or(ref_path)
                .to_string();
            match api
                .upload_attachment(&document.id, &name, mime_for_path(&name), bytes)
                .await
            {
                Ok(attachment) => {
                    attachments_uploaded += 1;
                    total_attachment_bytes += entry.size;
                    uploads.insert(ref_path.clone(), (attachment.url, entry.size));
                }
                Err(e) if !e.is_fatal() => {
                    log::warn!("{}: attachment {} failed: {}", node.page.source_id, ref_path, e);
                    failures.push(AttachmentFailure {
                        path: ref_path.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if !uploads.is_empty() {
            let resolved = resolve_attachment_urls(&transformed.text, &uploads);
            match api.update_document(&document.id, &resolved).await {
                Ok(()) => {}
                Err(e) if !e.is_fatal() => {
                    log::warn!("{}: content update failed: {}", node.page.source_id, e);
                    failures.push(AttachmentFailure {
                        path: "(content update)".to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let status = if failures.is_empty() {
            DocumentStatus::Created
        } else {
            DocumentStatus::CreatedWithAttachmentFailures
        };
        outcomes.push(DocumentOutcome {
            source_id: node.page.source_id.clone(),
            title: node.page.title.clone(),
            status,
            destination_id: Some(document.id),
            error: None,
            attachment_failures: failures,
        });
    }

    let stats = MigrationStats {
        documents_created,
        attachments_uploaded,
        total_attachment_bytes,
        started_at,
        finished_at: Utc::now(),
    };
    log::info!(
        "Migration finished: {} documents, {} attachments ({})",
        stats.documents_created,
        stats.attachments_uploaded,
        format_bytes(stats.total_attachment_bytes)
    );

    Ok(MigrationReport {
        collection_id: collection.id,
        mapping,
        outcomes,
        stats,
    })
}

fn failed_outcome(node: &PageNode, error: String) -> DocumentOutcome {
    DocumentOutcome {
        source_id: node.page.source_id.clone(),
        title: node.page.title.clone(),
        status: DocumentStatus::Failed,
        destination_id: None,
        error: Some(error),
        attachment_failures: Vec::new(),
    }
}

fn skipped_outcome(node: &PageNode) -> DocumentOutcome {
    DocumentOutcome {
        source_id: node.page.source_id.clone(),
        title: node.page.title.clone(),
        status: DocumentStatus::Skipped,
        destination_id: None,
        error: Some("run deadline reached".to_string()),
        attachment_failures: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use zip::write::SimpleFileOptions;

    use crate::error::AppError;
    use crate::models::{Attachment, Collection, Document};
    use crate::services::outline::check_upload_size;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        CreateCollection { name: String },
        CreateDocument { title: String, parent: Option<String> },
        UpdateDocument { id: String, text: String },
        UploadAttachment { name: String },
    }

    #[derive(Default)]
    struct MockOutline {
        calls: Mutex<Vec<Call>>,
        /// Upload size limit; 0 means unlimited
        max_upload_bytes: u64,
        /// Make `create_document` fail for this title
        fail_title: Option<String>,
    }

    impl MockOutline {
        fn new() -> Self {
            Self::default()
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().expect("lock").clone()
        }

        fn push(&self, call: Call) -> usize {
            let mut calls = self.calls.lock().expect("lock");
            calls.push(call);
            calls.len()
        }

        fn created_documents(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| matches!(c, Call::CreateDocument { .. }))
                .collect()
        }
    }

    #[async_trait]
    impl OutlineApi for MockOutline {
        async fn verify_auth(&self) -> Result<String> {
            Ok("Tester".to_string())
        }

        async fn get_collection(&self, id: &str) -> Result<Collection> {
            Ok(Collection {
                id: id.to_string(),
                name: "Existing".to_string(),
                description: None,
                color: None,
            })
        }

        async fn create_collection(
            &self,
            name: &str,
            _description: &str,
            _color: &str,
        ) -> Result<Collection> {
            self.push(Call::CreateCollection {
                name: name.to_string(),
            });
            Ok(Collection {
                id: "col-1".to_string(),
                name: name.to_string(),
                description: None,
                color: None,
            })
        }

        async fn create_document(
            &self,
            title: &str,
            _text: &str,
            collection_id: &str,
            parent_document_id: Option<&str>,
        ) -> Result<Document> {
            if self.fail_title.as_deref() == Some(title) {
                return Err(AppError::api(
                    format!("document {title}"),
                    "HTTP 400 Bad Request",
                    Some(400),
                ));
            }
            let n = self.push(Call::CreateDocument {
                title: title.to_string(),
                parent: parent_document_id.map(String::from),
            });
            Ok(Document {
                id: format!("doc-{n}"),
                title: title.to_string(),
                collection_id: collection_id.to_string(),
                parent_document_id: parent_document_id.map(String::from),
                url: format!("/doc/{n}"),
            })
        }

        async fn update_document(&self, id: &str, text: &str) -> Result<()> {
            self.push(Call::UpdateDocument {
                id: id.to_string(),
                text: text.to_string(),
            });
            Ok(())
        }

        async fn upload_attachment(
            &self,
            _document_id: &str,
            name: &str,
            _content_type: &str,
            bytes: Vec<u8>,
        ) -> Result<Attachment> {
            if self.max_upload_bytes > 0 {
                check_upload_size(name, bytes.len() as u64, self.max_upload_bytes)?;
            }
            let n = self.push(Call::UploadAttachment {
                name: name.to_string(),
            });
            Ok(Attachment {
                id: format!("att-{n}"),
                url: format!("https://files.example.com/{name}"),
                name: name.to_string(),
                size: bytes.len() as u64,
            })
        }
    }

    fn build_zip(entries: &[(&str, &[u8])]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let mut writer = zip::ZipWriter::new(file.reopen().expect("reopen"));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, bytes) in entries {
            writer.start_file(*name, options).expect("start file");
            writer.write_all(bytes).expect("write entry");
        }
        writer.finish().expect("finish zip");
        file
    }

    #[tokio::test]
    async fn end_to_end_three_documents_one_attachment() {
        let file = build_zip(&[
            ("Space/A.md", b"# A"),
            (
                "Space/A/B.md",
                b"body ![pic](/files/u1/pic.png) end",
            ),
            ("Space/C.md", b"# C"),
            ("Space/files/u1/pic.png", b"\x89PNGdata"),
        ]);
        let api = MockOutline::new();

        let report = run_migration(&api, &Config::default(), file.path(), None)
            .await
            .expect("migration");

        let documents = api.created_documents();
        assert_eq!(documents.len(), 3);
        // Roots in title order, then children.
        assert_eq!(
            documents[0],
            Call::CreateDocument {
                title: "A".to_string(),
                parent: None
            }
        );
        assert_eq!(
            documents[1],
            Call::CreateDocument {
                title: "C".to_string(),
                parent: None
            }
        );
        let a_destination = report.mapping.get("A.md").expect("A mapped").clone();
        assert_eq!(
            documents[2],
            Call::CreateDocument {
                title: "B".to_string(),
                parent: Some(a_destination)
            }
        );

        let uploads: Vec<_> = api
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::UploadAttachment { .. }))
            .collect();
        assert_eq!(uploads.len(), 1);

        assert!(api.calls().contains(&Call::CreateCollection {
            name: "Space".to_string()
        }));
        assert_eq!(report.collection_id, "col-1");
        assert_eq!(report.stats.documents_created, 3);
        assert_eq!(report.stats.attachments_uploaded, 1);
        assert!(!report.has_failures());

        // The content update resolved the placeholder to the upload URL.
        let update = api
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::UpdateDocument { text, .. } => Some(text),
                _ => None,
            })
            .expect("content update issued");
        assert!(update.contains("https://files.example.com/pic.png"));
        assert!(!update.contains("attachment://"));
    }

    #[tokio::test]
    async fn oversized_attachment_recorded_while_others_upload() {
        let file = build_zip(&[
            (
                "Space/A.md",
                b"![big](/files/u1/big.bin) and ![small](/files/u2/small.bin)",
            ),
            ("Space/files/u1/big.bin", b"0123456789X"),
            ("Space/files/u2/small.bin", b"ok!"),
        ]);
        let api = MockOutline {
            max_upload_bytes: 10,
            ..MockOutline::new()
        };

        let report = run_migration(&api, &Config::default(), file.path(), None)
            .await
            .expect("migration");

        let uploads: Vec<_> = api
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::UploadAttachment { .. }))
            .collect();
        assert_eq!(
            uploads,
            vec![Call::UploadAttachment {
                name: "small.bin".to_string()
            }]
        );

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.status, DocumentStatus::CreatedWithAttachmentFailures);
        assert_eq!(outcome.attachment_failures.len(), 1);
        assert_eq!(outcome.attachment_failures[0].path, "files/u1/big.bin");

        // The failed reference keeps its placeholder; the small one resolved.
        let update = api
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::UpdateDocument { text, .. } => Some(text),
                _ => None,
            })
            .expect("content update issued");
        assert!(update.contains("attachment://files/u1/big.bin"));
        assert!(update.contains("https://files.example.com/small.bin"));
    }

    #[tokio::test]
    async fn existing_collection_is_used_without_creation() {
        let file = build_zip(&[("Space/A.md", b"# A")]);
        let api = MockOutline::new();

        let report = run_migration(&api, &Config::default(), file.path(), Some("col-9"))
            .await
            .expect("migration");

        assert_eq!(report.collection_id, "col-9");
        assert!(
            !api.calls()
                .iter()
                .any(|c| matches!(c, Call::CreateCollection { .. }))
        );
    }

    #[tokio::test]
    async fn missing_attachment_is_recorded() {
        let file = build_zip(&[("Space/A.md", b"![gone](/files/u1/gone.png)")]);
        let api = MockOutline::new();

        let report = run_migration(&api, &Config::default(), file.path(), None)
            .await
            .expect("migration");

        assert_eq!(
            report.outcomes[0].status,
            DocumentStatus::CreatedWithAttachmentFailures
        );
        assert!(
            !api.calls()
                .iter()
                .any(|c| matches!(c, Call::UploadAttachment { .. }))
        );
        // No uploads succeeded, so no content update either.
        assert!(
            !api.calls()
                .iter()
                .any(|c| matches!(c, Call::UpdateDocument { .. }))
        );
    }

    #[tokio::test]
    async fn run_deadline_skips_remaining_documents() {
        let file = build_zip(&[("Space/A.md", b"# A"), ("Space/B.md", b"# B")]);
        let api = MockOutline::new();
        let mut config = Config::default();
        config.migration.run_timeout_secs = Some(0);

        let report = run_migration(&api, &config, file.path(), None)
            .await
            .expect("migration");

        // Count in equals count out; nothing was attempted.
        assert_eq!(report.outcomes.len(), 2);
        assert!(
            report
                .outcomes
                .iter()
                .all(|o| o.status == DocumentStatus::Skipped)
        );
        assert_eq!(report.stats.documents_created, 0);
        assert!(api.created_documents().is_empty());
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn upload_name_comes_from_the_markdown_reference() {
        // The uuid fallback matches an entry whose basename differs from
        // the reference; the reference name wins.
        let file = build_zip(&[
            ("Space/Home.md", b"![x](/files/u1/photo.png)"),
            ("Space/Home/files/u1/pic.png", b"\x89PNG"),
        ]);
        let api = MockOutline::new();

        let report = run_migration(&api, &Config::default(), file.path(), None)
            .await
            .expect("migration");

        let uploads: Vec<_> = api
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::UploadAttachment { .. }))
            .collect();
        assert_eq!(
            uploads,
            vec![Call::UploadAttachment {
                name: "photo.png".to_string()
            }]
        );
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn document_failure_is_recorded_and_children_survive() {
        let file = build_zip(&[
            ("Space/A.md", b"# A"),
            ("Space/Bad.md", b"# Bad"),
            ("Space/Bad/Child.md", b"# Child"),
        ]);
        let api = MockOutline {
            fail_title: Some("Bad".to_string()),
            ..MockOutline::new()
        };

        let report = run_migration(&api, &Config::default(), file.path(), None)
            .await
            .expect("migration");

        // Count in equals count out: created + failed.
        assert_eq!(report.outcomes.len(), 3);
        let bad = report
            .outcomes
            .iter()
            .find(|o| o.title == "Bad")
            .expect("bad outcome");
        assert_eq!(bad.status, DocumentStatus::Failed);
        assert!(bad.error.is_some());

        // The orphaned child lands at the collection root instead of
        // being dropped.
        let child = api
            .created_documents()
            .into_iter()
            .find(|c| matches!(c, Call::CreateDocument { title, .. } if title == "Child"))
            .expect("child created");
        assert_eq!(
            child,
            Call::CreateDocument {
                title: "Child".to_string(),
                parent: None
            }
        );
        assert!(report.has_failures());
    }
}
