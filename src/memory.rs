use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock};

use crate::{Error, Metadata, NewUpload, Upload, UploadStore, UploadStream};

/// [`UploadStore`] keeping every upload in memory.
///
/// Each upload has an append lock, held for the whole of an append, and a
/// state lock taken only to read or extend the upload. Appends to the same
/// upload are serialised while HEAD sees the live offset.
#[derive(Debug, Default)]
pub struct MemoryStore {
    uploads: RwLock<HashMap<String, Arc<Slot>>>,
}

#[derive(Debug)]
struct Slot {
    append: Mutex<()>,
    state: Mutex<Entry>,
}

#[derive(Debug)]
struct Entry {
    length: u64,
    metadata: Metadata,
    data: BytesMut,
}

impl Entry {
    fn offset(&self) -> u64 {
        self.data.len() as u64
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Bytes received so far for `uid`.
    pub async fn contents(&self, uid: &str) -> Option<bytes::Bytes> {
        let slot = self.slot(uid).await.ok()?;
        let state = slot.state.lock().await;
        Some(state.data.clone().freeze())
    }

    async fn slot(&self, uid: &str) -> Result<Arc<Slot>, Error> {
        self.uploads.read().await.get(uid).cloned().ok_or(Error::NotFound)
    }
}

#[async_trait]
impl UploadStore for MemoryStore {
    async fn get_upload(&self, uid: &str) -> Result<Upload, Error> {
        let slot = self.slot(uid).await?;
        let state = slot.state.lock().await;
        Ok(Upload { length: state.length, offset: state.offset(), metadata: state.metadata.clone() })
    }

    async fn upload(&self, uid: &str, offset: u64, mut body: UploadStream) -> Result<u64, Error> {
        let slot = self.slot(uid).await?;
        let _writer = slot.append.lock().await;

        let current = slot.state.lock().await.offset();
        if current != offset {
            return Err(Error::Conflict { expected: current, received: offset });
        }

        // bytes appended before a body error are kept, the client resumes
        // from the offset reported by HEAD
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            slot.state.lock().await.data.extend_from_slice(&chunk);
        }

        let offset = slot.state.lock().await.offset();
        tracing::debug!(uid, offset, "appended to upload");
        Ok(offset)
    }

    async fn create_upload(&self, upload: NewUpload) -> Result<(), Error> {
        let entry = Entry {
            length: upload.upload_length,
            metadata: upload.upload_metadata,
            data: BytesMut::new(),
        };
        let mut uploads = self.uploads.write().await;
        if uploads.contains_key(&upload.uid) {
            return Err(Error::user(format!("upload {} already exists", upload.uid)));
        }
        let slot = Slot { append: Mutex::new(()), state: Mutex::new(entry) };
        uploads.insert(upload.uid, Arc::new(slot));
        Ok(())
    }

    async fn delete(&self, uid: &str) -> Result<(), Error> {
        self.uploads.write().await.remove(uid).map(|_| ()).ok_or(Error::NotFound)
    }
}
