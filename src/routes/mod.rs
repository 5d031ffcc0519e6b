//! The server's route table.
//!
//! | Method | Pattern       | Behaviour                                          |
//! |--------|---------------|----------------------------------------------------|
//! | GET    | `/`           | `200`, no body                                     |
//! | GET    | `/echo/*`     | `200`, the path remainder as text                  |
//! | GET    | `/user-agent` | `200` with the `User-Agent` value, `400` without   |
//! | GET    | `/files/*`    | streams a file from the files root, `404` if none  |
//! | POST   | `/files/*`    | writes the request body to the files root, `201`   |
//!
//! Both `/files/*` routes answer `500` when the server runs without a files
//! root.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::http::{Content, Response, StatusCode};
use crate::router::{HandlerResult, RequestContext, Router};

/// Status phrase sent when an upload ends before its declared length.
pub const SIZE_MISMATCH_PHRASE: &str = "Size mismatch";

/// Builds the router serving every route of the server.
///
/// `files_root` is the directory behind `/files/*`; `None` disables those
/// routes.
pub fn build(files_root: Option<PathBuf>) -> Router {
    let files = FileStore::new(files_root);
    let uploads = files.clone();

    let mut router = Router::new();
    router.get("/", |ctx| Box::pin(index(ctx)));
    router.get("/echo/*", |ctx| Box::pin(echo(ctx)));
    router.get("/user-agent", |ctx| Box::pin(user_agent(ctx)));
    router.get("/files/*", move |ctx| Box::pin(files.clone().download(ctx)));
    router.post("/files/*", move |ctx| Box::pin(uploads.clone().upload(ctx)));
    router
}

async fn index(_ctx: RequestContext<'_>) -> HandlerResult {
    Ok(Response::new(StatusCode::Ok))
}

async fn echo(ctx: RequestContext<'_>) -> HandlerResult {
    Ok(Response::text(ctx.remainder))
}

async fn user_agent(ctx: RequestContext<'_>) -> HandlerResult {
    match ctx.headers.get("User-Agent") {
        Some(agent) if !agent.trim().is_empty() => Ok(Response::text(agent)),
        _ => Ok(Response::new(StatusCode::BadRequest)),
    }
}

/// The directory served by `/files/*`.
#[derive(Debug, Clone, Default)]
pub struct FileStore {
    root: Option<Arc<Path>>,
}

impl FileStore {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root: root.map(Arc::from),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Maps a wildcard remainder to a path under the root.
    ///
    /// Returns `None` when there is no root, when the remainder is empty, or
    /// when any of its components would leave the root (`..`, an absolute
    /// path, a drive prefix).
    pub fn resolve(&self, remainder: &str) -> Option<PathBuf> {
        let root = self.root()?;
        let relative = Path::new(remainder.trim_start_matches('/'));

        if relative.as_os_str().is_empty() {
            return None;
        }
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return None;
        }

        Some(root.join(relative))
    }

    async fn download(self, ctx: RequestContext<'_>) -> HandlerResult {
        if self.root.is_none() {
            warn!("no files directory configured");
            return Ok(Response::new(StatusCode::InternalServerError));
        }

        let Some(path) = self.resolve(&ctx.remainder) else {
            debug!(remainder = %ctx.remainder, "rejecting file path");
            return Ok(Response::new(StatusCode::NotFound));
        };
        info!(path = %path.display(), "serving file");

        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return Ok(Response::new(StatusCode::NotFound)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Response::new(StatusCode::NotFound));
            }
            Err(e) => return Err(e.into()),
        }

        match Content::file(&path).await {
            Ok(content) => Ok(Response::new(StatusCode::Ok).content(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Response::new(StatusCode::NotFound)),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the request body to the resolved path.
    ///
    /// The file is created with `File::create`, which truncates an existing
    /// one; concurrent uploads to the same path interleave and the stored
    /// content is undefined.
    async fn upload(self, ctx: RequestContext<'_>) -> HandlerResult {
        if self.root.is_none() {
            warn!("no files directory configured");
            return Ok(Response::new(StatusCode::InternalServerError));
        }

        let Some(expected) = ctx.headers.content_length() else {
            debug!("upload without a valid Content-Length");
            return Ok(Response::new(StatusCode::BadRequest));
        };

        let Some(path) = self.resolve(&ctx.remainder) else {
            debug!(remainder = %ctx.remainder, "rejecting file path");
            return Ok(Response::new(StatusCode::BadRequest));
        };
        info!(path = %path.display(), bytes = expected, "receiving file");

        let mut file = File::create(&path).await?;
        let received = match ctx.session.read_exact_into(&mut file, expected, ctx.cancel).await {
            Ok(received) => received,
            Err(e) => {
                drop(file);
                discard(&path).await;
                return Err(e.into());
            }
        };
        file.flush().await?;
        drop(file);

        if received != expected {
            warn!(path = %path.display(), expected, received, "upload ended early");
            discard(&path).await;
            return Ok(Response::new(StatusCode::InternalServerError).phrase(SIZE_MISMATCH_PHRASE));
        }

        Ok(Response::new(StatusCode::Created))
    }
}

// Removes a partially written upload.
async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "failed to remove partial upload");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_util::sync::CancellationToken;

    async fn exchange(router: &Router, raw: &[u8]) -> String {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (mut rd, mut wr) = tokio::io::split(client);
        wr.write_all(raw).await.unwrap();
        wr.shutdown().await.unwrap();

        let mut session = Session::new(server);
        router
            .handle(&mut session, &CancellationToken::new())
            .await
            .unwrap();
        drop(session);

        let mut out = String::new();
        rd.read_to_string(&mut out).await.unwrap();
        out
    }

    #[test]
    fn resolve_stays_under_root() {
        let store = FileStore::new(Some(PathBuf::from("/srv/files")));
        assert_eq!(
            store.resolve("a.txt"),
            Some(PathBuf::from("/srv/files/a.txt"))
        );
        assert_eq!(
            store.resolve("dir/a.txt"),
            Some(PathBuf::from("/srv/files/dir/a.txt"))
        );
        assert_eq!(store.resolve("../etc/passwd"), None);
        assert_eq!(store.resolve("dir/../../x"), None);
        assert_eq!(store.resolve(""), None);
    }

    #[test]
    fn resolve_without_root() {
        assert_eq!(FileStore::default().resolve("a.txt"), None);
    }

    #[tokio::test]
    async fn index_is_empty_200() {
        let out = exchange(&build(None), b"GET / HTTP/1.1\r\n\r\n").await;
        assert_eq!(out, "HTTP/1.1 200 OK\r\n\r\n");
    }

    #[tokio::test]
    async fn echo_returns_remainder() {
        let out = exchange(&build(None), b"GET /echo/abc HTTP/1.1\r\n\r\n").await;
        assert_eq!(
            out,
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 3\r\n\r\nabc"
        );
    }

    #[tokio::test]
    async fn echo_keeps_nested_segments() {
        let out = exchange(&build(None), b"GET /echo/a/b/c HTTP/1.1\r\n\r\n").await;
        assert!(out.ends_with("Content-Length: 5\r\n\r\na/b/c"), "{out}");
    }

    #[tokio::test]
    async fn user_agent_is_echoed() {
        let raw = b"GET /user-agent HTTP/1.1\r\nHost: localhost\r\nUser-Agent: foobar/1.2.3\r\n\r\n";
        let out = exchange(&build(None), raw).await;
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "{out}");
        assert!(out.ends_with("\r\n\r\nfoobar/1.2.3"), "{out}");
    }

    #[tokio::test]
    async fn missing_user_agent_is_400() {
        let out = exchange(&build(None), b"GET /user-agent HTTP/1.1\r\nHost: x\r\n\r\n").await;
        assert_eq!(out, "HTTP/1.1 400 BadRequest\r\n\r\n");
    }

    #[tokio::test]
    async fn files_without_root_is_500() {
        let router = build(None);
        let out = exchange(&router, b"GET /files/a HTTP/1.1\r\n\r\n").await;
        assert_eq!(out, "HTTP/1.1 500 InternalServerError\r\n\r\n");

        let out = exchange(
            &router,
            b"POST /files/a HTTP/1.1\r\nContent-Length: 1\r\n\r\nx",
        )
        .await;
        assert_eq!(out, "HTTP/1.1 500 InternalServerError\r\n\r\n");
    }

    #[tokio::test]
    async fn get_file_streams_octets() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("hello.txt"), b"hello world")
            .await
            .unwrap();

        let router = build(Some(dir.path().to_path_buf()));
        let out = exchange(&router, b"GET /files/hello.txt HTTP/1.1\r\n\r\n").await;
        assert_eq!(
            out,
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: 11\r\n\r\nhello world"
        );
    }

    #[tokio::test]
    async fn get_missing_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let router = build(Some(dir.path().to_path_buf()));
        let out = exchange(&router, b"GET /files/nope HTTP/1.1\r\n\r\n").await;
        assert_eq!(out, "HTTP/1.1 404 NotFound\r\n\r\n");
    }

    #[tokio::test]
    async fn get_directory_or_escape_is_404() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();
        let router = build(Some(dir.path().join("sub")));

        let out = exchange(&router, b"GET /files/ HTTP/1.1\r\n\r\n").await;
        assert_eq!(out, "HTTP/1.1 404 NotFound\r\n\r\n");

        tokio::fs::write(dir.path().join("secret"), b"x").await.unwrap();
        let out = exchange(&router, b"GET /files/../secret HTTP/1.1\r\n\r\n").await;
        assert_eq!(out, "HTTP/1.1 404 NotFound\r\n\r\n");
    }

    #[tokio::test]
    async fn post_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let router = build(Some(dir.path().to_path_buf()));

        let out = exchange(
            &router,
            b"POST /files/up.bin HTTP/1.1\r\nContent-Length: 5\r\n\r\n12345",
        )
        .await;
        assert_eq!(out, "HTTP/1.1 201 Created\r\n\r\n");

        let written = tokio::fs::read(dir.path().join("up.bin")).await.unwrap();
        assert_eq!(written, b"12345");
    }

    #[tokio::test]
    async fn post_zero_length_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let router = build(Some(dir.path().to_path_buf()));

        let out = exchange(
            &router,
            b"POST /files/empty HTTP/1.1\r\nContent-Length: 0\r\n\r\n",
        )
        .await;
        assert_eq!(out, "HTTP/1.1 201 Created\r\n\r\n");
        assert_eq!(tokio::fs::read(dir.path().join("empty")).await.unwrap(), b"");
    }

    #[tokio::test]
    async fn post_without_length_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let router = build(Some(dir.path().to_path_buf()));

        let out = exchange(&router, b"POST /files/a HTTP/1.1\r\n\r\nabc").await;
        assert_eq!(out, "HTTP/1.1 400 BadRequest\r\n\r\n");

        let out = exchange(
            &router,
            b"POST /files/a HTTP/1.1\r\nContent-Length: lots\r\n\r\nabc",
        )
        .await;
        assert_eq!(out, "HTTP/1.1 400 BadRequest\r\n\r\n");
        assert!(!dir.path().join("a").exists());
    }

    #[tokio::test]
    async fn short_upload_is_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let router = build(Some(dir.path().to_path_buf()));

        let out = exchange(
            &router,
            b"POST /files/short HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc",
        )
        .await;
        assert_eq!(out, "HTTP/1.1 500 Size mismatch\r\n\r\n");
        assert!(!dir.path().join("short").exists());
    }

    #[tokio::test]
    async fn post_escape_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        tokio::fs::create_dir(&root).await.unwrap();
        let router = build(Some(root));

        let out = exchange(
            &router,
            b"POST /files/../evil HTTP/1.1\r\nContent-Length: 1\r\n\r\nx",
        )
        .await;
        assert_eq!(out, "HTTP/1.1 400 BadRequest\r\n\r\n");
        assert!(!dir.path().join("evil").exists());
    }
}
