//! Direct-to-storage transfer of one concurrency window.

use super::classify::{classify_error, ErrorType};
use super::multipart;
use super::TransferContext;
use crate::error::BackendError;
use crate::logging::{log_info, log_warn, PIPELINE_COMPONENT};
use crate::upload_pipeline::backend::{DirectAuthorization, FileDescriptor, WriteGrant};
use crate::upload_pipeline::types::{StagedFile, TransferOutcome};
use futures::future::join_all;
use std::collections::{HashMap, VecDeque};

/// Transfer one window. Every file in `window` gets exactly one outcome.
pub async fn transfer_window(ctx: TransferContext<'_>, window: Vec<StagedFile>) -> Vec<TransferOutcome> {
    for file in &window {
        ctx.tracker.mark_uploading(file.index);
    }

    let descriptors: Vec<FileDescriptor> = window
        .iter()
        .map(|f| FileDescriptor::for_file(f, ctx.category))
        .collect();

    let authorizations = match ctx
        .backend
        .authorize_direct(ctx.container_id, &descriptors)
        .await
    {
        Ok(authorizations) => authorizations,
        Err(e) => {
            log_warn(
                PIPELINE_COMPONENT,
                &format!(
                    "Authorization failed for {} files ({}), falling back to multipart relay",
                    window.len(),
                    e
                ),
            )
            .unwrap_or_default();
            return multipart::transfer_sequential(ctx, window).await;
        }
    };

    let mut outcomes = Vec::with_capacity(window.len());
    let mut granted: Vec<(StagedFile, WriteGrant)> = Vec::with_capacity(window.len());
    for (file, authorization) in pair_authorizations(window, authorizations) {
        let grant = authorization
            .ok_or_else(|| format!("no authorization issued for {}", file.file_name))
            .and_then(|auth| auth.into_grant(&file.mime_type));
        match grant {
            Ok(grant) => granted.push((file, grant)),
            Err(reason) => outcomes.push(TransferOutcome::failed_with(
                file.index,
                format!("authorization refused: {}", reason),
                ErrorType::Client,
            )),
        }
    }

    let writes = join_all(granted.iter().map(|(file, grant)| async move {
        ctx.backend.write_direct(grant, file).await
    }))
    .await;

    let mut written: Vec<(StagedFile, WriteGrant)> = Vec::with_capacity(granted.len());
    for ((file, grant), result) in granted.into_iter().zip(writes) {
        match result {
            Ok(()) => written.push((file, grant)),
            Err(e) => outcomes.push(TransferOutcome::failed_with(
                file.index,
                format!("direct write failed: {}", e),
                classify_error(&e),
            )),
        }
    }

    if !written.is_empty() {
        outcomes.extend(register_written(ctx, written).await);
    }
    outcomes
}

/// Report the successfully written subset in one call; only a successful
/// registration completes a file.
async fn register_written(
    ctx: TransferContext<'_>,
    written: Vec<(StagedFile, WriteGrant)>,
) -> Vec<TransferOutcome> {
    let descriptors: Vec<FileDescriptor> = written
        .iter()
        .map(|(f, _)| FileDescriptor::for_file(f, ctx.category))
        .collect();

    let failure = match ctx
        .backend
        .register_uploads(ctx.container_id, &descriptors)
        .await
    {
        Ok(response) if response.success => None,
        Ok(_) => Some(BackendError::Rejected(
            "backend did not register the uploads".to_string(),
        )),
        Err(e) => Some(e),
    };

    match failure {
        None => {
            log_info(
                PIPELINE_COMPONENT,
                &format!("Registered {} direct uploads", written.len()),
            )
            .unwrap_or_default();
            written
                .into_iter()
                .map(|(file, grant)| TransferOutcome::completed(file.index, Some(remote_locator(&grant))))
                .collect()
        }
        Some(e) => {
            let error_type = classify_error(&e);
            written
                .into_iter()
                .map(|(file, grant)| {
                    log_warn(
                        PIPELINE_COMPONENT,
                        &format!(
                            "Registration failed for {}, bytes left orphaned at {}",
                            file.file_name,
                            remote_locator(&grant)
                        ),
                    )
                    .unwrap_or_default();
                    TransferOutcome::failed_with(
                        file.index,
                        format!("registration failed: {}", e),
                        error_type,
                    )
                })
                .collect()
        }
    }
}

/// Match authorizations to files by filename, in order, so duplicate names each
/// get their own entry. Files without an entry are paired with `None`.
fn pair_authorizations(
    files: Vec<StagedFile>,
    authorizations: Vec<DirectAuthorization>,
) -> Vec<(StagedFile, Option<DirectAuthorization>)> {
    let mut by_name: HashMap<String, VecDeque<DirectAuthorization>> = HashMap::new();
    for auth in authorizations {
        by_name.entry(auth.filename.clone()).or_default().push_back(auth);
    }

    files
        .into_iter()
        .map(|file| {
            let auth = by_name
                .get_mut(&file.file_name)
                .and_then(|queue| queue.pop_front());
            (file, auth)
        })
        .collect()
}

/// Storage key for a written file: the reported key, else the write URL's path.
pub fn remote_locator(grant: &WriteGrant) -> String {
    if let Some(key) = grant.key.as_deref().filter(|k| !k.is_empty()) {
        return key.to_string();
    }
    match url::Url::parse(&grant.write_url) {
        Ok(url) => url.path().trim_start_matches('/').to_string(),
        Err(_) => grant
            .write_url
            .split('?')
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(url: &str, key: Option<&str>) -> WriteGrant {
        WriteGrant {
            filename: "a.jpg".to_string(),
            write_url: url.to_string(),
            content_type: "image/jpeg".to_string(),
            key: key.map(str::to_string),
        }
    }

    fn staged(index: usize, name: &str) -> StagedFile {
        StagedFile {
            original_name: name.to_string(),
            file_name: name.to_string(),
            byte_size: 1,
            mime_type: "image/jpeg".to_string(),
            payload: Default::default(),
            index,
        }
    }

    fn auth(name: &str, url: &str) -> DirectAuthorization {
        DirectAuthorization {
            filename: name.to_string(),
            write_url: Some(url.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_locator_prefers_key() {
        let g = grant("https://bucket.example/sessions/1/a.jpg?X-Sig=abc", Some("sessions/1/a.jpg"));
        assert_eq!(remote_locator(&g), "sessions/1/a.jpg");
    }

    #[test]
    fn test_locator_strips_query() {
        let g = grant("https://bucket.example/sessions/1/a.jpg?X-Sig=abc", None);
        assert_eq!(remote_locator(&g), "sessions/1/a.jpg");

        let relative = grant("not a url?sig=1", None);
        assert_eq!(remote_locator(&relative), "not a url");
    }

    #[test]
    fn test_pairing_handles_duplicates_and_gaps() {
        let files = vec![staged(0, "a.jpg"), staged(1, "a.jpg"), staged(2, "b.jpg")];
        let auths = vec![auth("a.jpg", "https://s/1"), auth("a.jpg", "https://s/2")];

        let pairs = pair_authorizations(files, auths);
        assert_eq!(pairs[0].1.as_ref().unwrap().write_url.as_deref(), Some("https://s/1"));
        assert_eq!(pairs[1].1.as_ref().unwrap().write_url.as_deref(), Some("https://s/2"));
        assert!(pairs[2].1.is_none());
    }
}
