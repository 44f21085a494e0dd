//! S3 tests against LocalStack.
//!
//! Run with: cargo test --test integration_s3 -- --ignored --test-threads=1
//! Set AWS_ENDPOINT_URL to override the default http://localhost:4566.

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::sync::Arc;
use url::Url;

use zipvfs::archive::FormatCodec;
use zipvfs::cache::{ArchiveCache, CacheConfig};
use zipvfs::s3::S3Client;
use zipvfs::shell::ShellState;
use zipvfs::source::{RoutingSource, S3Source};

/// Test bucket name
const TEST_BUCKET: &str = "zipvfs-test-bucket";

/// Helper function to create an S3 client pointing to localstack
async fn create_localstack_client() -> Client {
    let endpoint_url =
        std::env::var("AWS_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4566".to_string());

    let config = aws_config::defaults(BehaviorVersion::latest())
        .region("us-east-1")
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&config)
        .endpoint_url(&endpoint_url)
        .force_path_style(true) // Required for LocalStack
        .build();

    Client::from_conf(s3_config)
}

/// Create a tar.gz archive with a root file, a directory and a nested file
fn create_test_targz() -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tar::Builder;

    let mut archive_data = Vec::new();
    {
        let encoder = GzEncoder::new(&mut archive_data, Compression::default());
        let mut tar = Builder::new(encoder);

        let file_content = b"Content inside archive\n";
        let mut header = tar::Header::new_gnu();
        header.set_path("archive_file.txt").unwrap();
        header.set_size(file_content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append(&header, &file_content[..]).unwrap();

        let mut dir_header = tar::Header::new_gnu();
        dir_header.set_path("app/").unwrap();
        dir_header.set_size(0);
        dir_header.set_mode(0o755);
        dir_header.set_entry_type(tar::EntryType::Directory);
        dir_header.set_cksum();
        tar.append(&dir_header, std::io::empty()).unwrap();

        let nested_content = b"Nested file content\n";
        let mut nested_header = tar::Header::new_gnu();
        nested_header.set_path("app/nested.txt").unwrap();
        nested_header.set_size(nested_content.len() as u64);
        nested_header.set_mode(0o644);
        nested_header.set_cksum();
        tar.append(&nested_header, &nested_content[..]).unwrap();

        tar.into_inner().unwrap().finish().unwrap();
    }

    archive_data
}

/// Create the bucket (if needed) and upload the test archive
async fn setup_test_bucket(client: &Client) -> Url {
    // Ignore "already exists" from earlier runs
    let _ = client.create_bucket().bucket(TEST_BUCKET).send().await;

    client
        .put_object()
        .bucket(TEST_BUCKET)
        .key("archives/test.tar.gz")
        .body(Bytes::from(create_test_targz()).into())
        .send()
        .await
        .expect("Failed to upload test.tar.gz");

    Url::parse(&format!("s3://{TEST_BUCKET}/archives/test.tar.gz")).unwrap()
}

fn create_cache(client: Client) -> ArchiveCache {
    let s3_client = Arc::new(S3Client::from_client(client));
    let source = RoutingSource::new().register(Arc::new(S3Source::new(s3_client)));
    ArchiveCache::with_collaborators(
        CacheConfig::default(),
        Arc::new(source),
        Arc::new(FormatCodec::new()),
    )
}

#[tokio::test]
#[ignore] // Requires LocalStack
async fn test_list_and_read_s3_archive() {
    let client = create_localstack_client().await;
    let resp = client.list_buckets().send().await;
    assert!(
        resp.is_ok(),
        "Failed to connect to Localstack S3. Is it running on localhost:4566?"
    );

    let location = setup_test_bucket(&client).await;
    let cache = create_cache(client);

    let root = cache.list_directory(&location, None).await.unwrap();
    let names: Vec<_> = root.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["archive_file.txt", "app"]);

    let app = cache.list_directory(&root[1].url, None).await.unwrap();
    assert_eq!(app[0].name, "nested.txt");
    assert_eq!(
        cache.read_text(&app[0].url, None).await.unwrap(),
        "Nested file content\n"
    );
}

#[tokio::test]
#[ignore] // Requires LocalStack
async fn test_shell_over_s3_archive() {
    let client = create_localstack_client().await;
    let location = setup_test_bucket(&client).await;
    let cache = create_cache(client);

    let mut shell = ShellState::new(cache, location).await.unwrap();

    shell.execute("cd app").await.expect("Failed to cd into app");
    assert_eq!(shell.cwd().to_string(), "/app");

    shell
        .execute("cat nested.txt /archive_file.txt")
        .await
        .expect("Failed to cat archive files");

    assert!(shell.execute("cd /missing").await.is_err());
}

#[tokio::test]
#[ignore] // Requires LocalStack
async fn test_missing_object_is_load_error() {
    let client = create_localstack_client().await;
    let _ = client.create_bucket().bucket(TEST_BUCKET).send().await;
    let cache = create_cache(client);

    let location = Url::parse(&format!("s3://{TEST_BUCKET}/archives/absent.zip")).unwrap();
    let err = cache.list_directory(&location, None).await.unwrap_err();
    assert!(matches!(err, zipvfs::VfsError::Load(_)));
    assert!(cache.is_empty());
}
