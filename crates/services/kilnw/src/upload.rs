//! Upload stage: ships every file of the build output to object storage.
//!
//! Files are attempted one after another, or through a bounded pool when more
//! than one upload may run at a time. A file that can't be read or stored is
//! reported and skipped; it never stops the rest of the batch.

use std::{path::Path, sync::Arc};

use futures_util::{StreamExt, stream};
use kiln_logs::LogPublisher;
use kiln_storage::{ObjectStore, UploadTarget, collect_targets};
use tracing::{error, info, warn};

use crate::prelude::*;

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub relative_path: String,
    pub key: String,
    /// Why the upload failed, if it did.
    pub error: Option<String>,
}

impl UploadResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Uploads build outputs through an [`ObjectStore`].
pub struct ArtifactUploader {
    store: Arc<dyn ObjectStore>,
    concurrency: usize,
}

impl ArtifactUploader {
    /// `concurrency` of 1 (or 0) uploads sequentially.
    pub fn new(store: Arc<dyn ObjectStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Upload every file under `output_dir` for `project_id`.
    ///
    /// Only a missing or unreadable `output_dir` is an error. Individual file
    /// failures are published and returned in the results.
    pub async fn upload(
        &self,
        output_dir: &Path,
        project_id: &str,
        publisher: &LogPublisher,
    ) -> Result<Vec<UploadResult>> {
        let targets = collect_targets(output_dir)?;
        info!(
            "Uploading {} files from {}",
            targets.len(),
            output_dir.display()
        );

        let results = if self.concurrency == 1 {
            self.upload_sequential(targets, project_id, publisher).await
        } else {
            self.upload_concurrent(targets, project_id, publisher).await
        };

        let failed = results.iter().filter(|r| !r.is_success()).count();
        if failed > 0 {
            warn!("{failed} of {} uploads failed", results.len());
        }
        Ok(results)
    }

    async fn upload_sequential(
        &self,
        targets: Vec<UploadTarget>,
        project_id: &str,
        publisher: &LogPublisher,
    ) -> Vec<UploadResult> {
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            publisher.publish(format!("Uploading {}", target.relative_path));
            let result = self.put_target(&target, project_id).await;
            publish_outcome(publisher, &result);
            results.push(result);
        }
        results
    }

    /// Each file's announcement and outcome are published together once it
    /// completes, so the pairs of different files never interleave.
    async fn upload_concurrent(
        &self,
        targets: Vec<UploadTarget>,
        project_id: &str,
        publisher: &LogPublisher,
    ) -> Vec<UploadResult> {
        let mut results = Vec::with_capacity(targets.len());
        let mut uploads = stream::iter(targets)
            .map(|target| async move { self.put_target(&target, project_id).await })
            .buffer_unordered(self.concurrency);

        while let Some(result) = uploads.next().await {
            publisher.publish(format!("Uploading {}", result.relative_path));
            publish_outcome(publisher, &result);
            results.push(result);
        }
        results
    }

    async fn put_target(&self, target: &UploadTarget, project_id: &str) -> UploadResult {
        let key = target.key(project_id);
        info!("Uploading {}", target.absolute_path.display());

        let outcome = match tokio::fs::read(&target.absolute_path).await {
            Ok(body) => self
                .store
                .put_object(&key, body, target.content_type.as_deref())
                .await
                .map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };

        match &outcome {
            Ok(()) => info!("Uploaded {}", target.absolute_path.display()),
            Err(err) => error!(
                "Error uploading {} - {err}",
                target.absolute_path.display()
            ),
        }

        UploadResult {
            relative_path: target.relative_path.clone(),
            key,
            error: outcome.err(),
        }
    }
}

fn publish_outcome(publisher: &LogPublisher, result: &UploadResult) {
    match &result.error {
        None => publisher.publish(format!("Uploaded {}", result.relative_path)),
        Some(err) => publisher.publish(format!(
            "Error uploading {}: {err}",
            result.relative_path
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use kiln_logs::memory::MemoryChannel;
    use kiln_storage::memory::MemoryStore;

    use super::*;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Couldn't create parent directory");
        }
        fs::write(path, contents).expect("Couldn't write file");
    }

    async fn upload_with(
        store: Arc<MemoryStore>,
        concurrency: usize,
        output_dir: &Path,
    ) -> (Result<Vec<UploadResult>>, Vec<String>) {
        let channel = Arc::new(MemoryChannel::new());
        let publisher = LogPublisher::spawn(channel.clone(), "demo");
        let uploader = ArtifactUploader::new(store, concurrency);

        let results = uploader.upload(output_dir, "demo", &publisher).await;
        publisher.shutdown().await;
        (results, channel.logs())
    }

    #[tokio::test]
    async fn uploads_each_file_with_key_and_content_type() {
        let dir = tempfile::tempdir().expect("Couldn't create temp dir");
        write(dir.path(), "index.html", "<html></html>");
        write(dir.path(), "assets/main.js", "console.log('hi')");
        let store = Arc::new(MemoryStore::new());

        let (results, logs) = upload_with(store.clone(), 1, dir.path()).await;
        let results = results.expect("Upload stage failed");

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(UploadResult::is_success));
        assert_eq!(
            logs,
            vec![
                "Uploading index.html",
                "Uploaded index.html",
                "Uploading assets/main.js",
                "Uploaded assets/main.js",
            ]
        );

        let index = store
            .get("__outputs/demo/index.html")
            .expect("index.html not stored");
        assert_eq!(index.body, b"<html></html>");
        assert_eq!(index.content_type.as_deref(), Some("text/html"));
        assert!(store.get("__outputs/demo/assets/main.js").is_some());
    }

    #[tokio::test]
    async fn files_without_known_extension_upload_without_content_type() {
        let dir = tempfile::tempdir().expect("Couldn't create temp dir");
        write(dir.path(), "LICENSE", "MIT");
        write(dir.path(), "data.kilnblob", "blob");
        let store = Arc::new(MemoryStore::new());

        let (results, logs) = upload_with(store.clone(), 1, dir.path()).await;
        let results = results.expect("Upload stage failed");

        assert!(results.iter().all(UploadResult::is_success));
        assert_eq!(
            logs,
            vec![
                "Uploading LICENSE",
                "Uploaded LICENSE",
                "Uploading data.kilnblob",
                "Uploaded data.kilnblob",
            ]
        );
        let license = store
            .get("__outputs/demo/LICENSE")
            .expect("LICENSE not stored");
        assert_eq!(license.body, b"MIT");
        assert_eq!(license.content_type, None);
        let blob = store
            .get("__outputs/demo/data.kilnblob")
            .expect("data.kilnblob not stored");
        assert_eq!(blob.content_type, None);
    }

    #[tokio::test]
    async fn failures_are_isolated_per_file() {
        let dir = tempfile::tempdir().expect("Couldn't create temp dir");
        for i in 0..6 {
            write(dir.path(), &format!("page{i}.html"), "page");
        }
        let store = Arc::new(MemoryStore::new());
        store.fail_key("__outputs/demo/page1.html");
        store.fail_key("__outputs/demo/page4.html");

        let (results, logs) = upload_with(store.clone(), 1, dir.path()).await;
        let results = results.expect("Upload stage failed");

        assert_eq!(results.len(), 6);
        let failed: Vec<&str> = results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.relative_path.as_str())
            .collect();
        assert_eq!(failed, vec!["page1.html", "page4.html"]);
        assert_eq!(store.attempted_keys().len(), 6);
        assert_eq!(store.keys().len(), 4);
        assert!(logs.contains(&String::from(
            "Error uploading page1.html: Access Denied for __outputs/demo/page1.html"
        )));
        assert!(logs.contains(&String::from("Uploaded page5.html")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_file_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().expect("Couldn't create temp dir");
        write(dir.path(), "b.txt", "fine");
        std::os::unix::fs::symlink(dir.path().join("gone.txt"), dir.path().join("a.txt"))
            .expect("Couldn't create symlink");
        let store = Arc::new(MemoryStore::new());

        let (results, logs) = upload_with(store.clone(), 1, dir.path()).await;
        let results = results.expect("Upload stage failed");

        assert_eq!(results.len(), 2);
        assert!(!results[0].is_success());
        assert!(results[1].is_success());
        assert!(logs[1].starts_with("Error uploading a.txt: "));
        assert_eq!(logs[3], "Uploaded b.txt");
    }

    #[tokio::test]
    async fn directories_produce_nothing() {
        let dir = tempfile::tempdir().expect("Couldn't create temp dir");
        fs::create_dir_all(dir.path().join("assets/fonts")).expect("Couldn't create dirs");
        let store = Arc::new(MemoryStore::new());

        let (results, logs) = upload_with(store.clone(), 1, dir.path()).await;

        assert!(results.expect("Upload stage failed").is_empty());
        assert!(logs.is_empty());
        assert!(store.attempted_keys().is_empty());
    }

    #[tokio::test]
    async fn missing_output_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("Couldn't create temp dir");
        let store = Arc::new(MemoryStore::new());

        let (results, logs) = upload_with(store, 1, &dir.path().join("dist")).await;

        assert!(matches!(results, Err(Error::OutputDirectory(_))));
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn concurrent_uploads_keep_pairs_together() {
        let dir = tempfile::tempdir().expect("Couldn't create temp dir");
        for i in 0..20 {
            write(dir.path(), &format!("chunk-{i:02}.js"), "chunk");
        }
        let store = Arc::new(MemoryStore::new());
        store.fail_key("__outputs/demo/chunk-07.js");

        let (results, logs) = upload_with(store.clone(), 4, dir.path()).await;
        let results = results.expect("Upload stage failed");

        assert_eq!(results.len(), 20);
        assert_eq!(results.iter().filter(|r| !r.is_success()).count(), 1);
        assert_eq!(logs.len(), 40);
        for pair in logs.chunks(2) {
            let file = pair[0]
                .strip_prefix("Uploading ")
                .expect("Pair doesn't start with an announcement");
            assert!(
                pair[1] == format!("Uploaded {file}")
                    || pair[1].starts_with(&format!("Error uploading {file}: ")),
                "Unexpected pair {pair:?}"
            );
        }
    }
}
