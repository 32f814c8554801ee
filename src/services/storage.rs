use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::time::Duration;

/// Object storage used by the API boundary: signed URLs for the client, plain
/// reads and writes for job bookkeeping.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Signed URL the client PUTs raw bytes to.
    async fn presign_put(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;

    /// Signed URL for reading an object.
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    /// `None` when the object does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Every key under `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Location string handed to the inference backend.
    fn uri(&self, key: &str) -> String;

    async fn health_check(&self) -> Result<(), StorageError>;
}

/// S3-compatible object store (AWS S3, R2, MinIO).
pub struct S3Store {
    bucket: Box<Bucket>,
}

impl S3Store {
    pub fn new(
        bucket_name: &str,
        region: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self { bucket })
    }
}

fn ttl_secs(ttl: Duration) -> u32 {
    ttl.as_secs().clamp(1, u32::MAX as u64) as u32
}

fn check(key: &str, status: u16) -> Result<(), StorageError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(StorageError::Status {
            key: key.to_string(),
            status,
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn presign_put(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        Ok(self.bucket.presign_put(key, ttl_secs(ttl), None, None).await?)
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        Ok(self.bucket.presign_get(key, ttl_secs(ttl), None).await?)
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await?;
        check(key, response.status_code())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let response = self.bucket.get_object(key).await?;
        match response.status_code() {
            404 => Ok(None),
            status => {
                check(key, status)?;
                Ok(Some(response.to_vec()))
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let (_, status) = self.bucket.head_object(key).await?;
        match status {
            404 => Ok(false),
            status => check(key, status).map(|_| true),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let response = self.bucket.delete_object(key).await?;
        check(key, response.status_code())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let pages = self.bucket.list(prefix.to_string(), None).await?;
        Ok(pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| object.key)
            .collect())
    }

    fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket.name(), key)
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        let (_, status) = self
            .bucket
            .list_page(String::new(), None, None, None, Some(1))
            .await?;
        check("", status)
    }
}

/// Last path component of a client-supplied filename.
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        "upload".to_string()
    } else {
        name.to_string()
    }
}

/// Where a presigned upload lands.
pub fn upload_key(upload_id: &str, filename: &str) -> String {
    format!("uploads/{upload_id}/{filename}")
}

/// Where an inline (base64) submission is stored.
pub fn input_key(user_id: &str, job_id: &str, filename: &str) -> String {
    format!("input/{user_id}/{job_id}/{filename}")
}

/// Everything stored for one job's input side.
pub fn job_input_prefix(user_id: &str, job_id: &str) -> String {
    format!("input/{user_id}/{job_id}/")
}

pub fn inference_input_key(user_id: &str, job_id: &str) -> String {
    format!("{}inference-input.json", job_input_prefix(user_id, job_id))
}

pub fn input_prefix(user_id: &str) -> String {
    format!("input/{user_id}/")
}

pub fn output_prefix(user_id: &str, job_id: &str) -> String {
    format!("output/{user_id}/{job_id}/")
}

pub fn output_key(user_id: &str, job_id: &str) -> String {
    format!("{}result.json", output_prefix(user_id, job_id))
}

pub fn failure_prefix(user_id: &str, job_id: &str) -> String {
    format!("failure/{user_id}/{job_id}/")
}

pub fn failure_key(user_id: &str, job_id: &str) -> String {
    format!("{}error.json", failure_prefix(user_id, job_id))
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Object store returned HTTP {status} for '{key}'")]
    Status { key: String, status: u16 },

    #[error("Storage configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("scan.pdf"), "scan.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\receipt.png"), "receipt.png");
        assert_eq!(sanitize_filename("dir/"), "upload");
        assert_eq!(sanitize_filename(".."), "upload");
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(upload_key("u1", "a.png"), "uploads/u1/a.png");
        assert_eq!(input_key("alice", "j1", "a.png"), "input/alice/j1/a.png");
        assert_eq!(
            inference_input_key("alice", "j1"),
            "input/alice/j1/inference-input.json"
        );
        assert_eq!(output_key("alice", "j1"), "output/alice/j1/result.json");
        assert_eq!(failure_key("alice", "j1"), "failure/alice/j1/error.json");
        assert!(output_key("alice", "j1").starts_with(&output_prefix("alice", "j1")));
    }

    #[test]
    fn test_status_check() {
        assert!(check("k", 200).is_ok());
        assert!(check("k", 204).is_ok());
        assert!(matches!(
            check("k", 403),
            Err(StorageError::Status { status: 403, .. })
        ));
    }
}
