use std::{future::Future, time::Duration};

use log::{debug, log_enabled, trace, warn};
use tokio::sync::watch;

use crate::{
    config::Config,
    error::Result,
    post::document::{Document, DocumentList},
};

use super::{check_status, is_not_found, HttpClient};

const MIN_POLL: Duration = Duration::from_millis(100);

/// A remote collection of post documents, keyed by post id.
pub trait RemoteStore: Clone + Send + Sync + 'static {
    fn exists(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Write the whole document, replacing anything stored under its id.
    fn set(&self, document: &Document) -> impl Future<Output = Result<()>> + Send;

    /// Partial update, only the supplied fields are touched.
    fn merge(&self, document: &Document) -> impl Future<Output = Result<()>> + Send;

    fn list(&self) -> impl Future<Output = Result<Vec<Document>>> + Send;

    /// Live view of the collection. The receiver is updated with the full
    /// document list on every change, until it is dropped.
    fn watch(&self) -> watch::Receiver<Vec<Document>>;
}

/// Document collection served over HTTP.
///
/// `GET {base}/{collection}` lists, and `GET`/`PUT`/`PATCH`
/// `{base}/{collection}/{id}` read, set and merge single documents.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: HttpClient,
    collection_url: String,
    poll: Duration,
}

impl HttpRemote {
    pub fn new(config: &Config, base_url: &str) -> Self {
        Self::with_client(
            HttpClient::new(config),
            base_url,
            config.collection(),
            config.poll(),
        )
    }

    pub fn with_client(client: HttpClient, base_url: &str, collection: &str, poll: Duration) -> Self {
        let collection_url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            urlencoding::encode(collection)
        );
        Self {
            client,
            collection_url,
            poll,
        }
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}", self.collection_url, urlencoding::encode(id))
    }
}

impl RemoteStore for HttpRemote {
    async fn exists(&self, id: &str) -> Result<bool> {
        let url = self.document_url(id);
        let response = self.client.send(self.client.get(&url)).await?;
        debug!("GET {} ({})", url, response.status());
        if is_not_found(&response) {
            return Ok(false);
        }
        check_status(response)?;
        Ok(true)
    }

    async fn set(&self, document: &Document) -> Result<()> {
        let url = self.document_url(&document.id);
        let request = self.client.put(&url).json(document);
        check_status(self.client.send(request).await?)?;
        debug!("PUT {}", url);
        Ok(())
    }

    async fn merge(&self, document: &Document) -> Result<()> {
        let url = self.document_url(&document.id);
        let request = self.client.patch(&url).json(document);
        check_status(self.client.send(request).await?)?;
        debug!("PATCH {}", url);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Document>> {
        let response = self.client.send(self.client.get(&self.collection_url)).await?;
        let response = check_status(response)?;
        let body = response.text().await?;

        debug!("GET {}", self.collection_url);
        if log_enabled!(log::Level::Trace) {
            trace!("{}", body);
        }

        let list: DocumentList = serde_json::from_str(&body)?;
        Ok(list.documents)
    }

    fn watch(&self) -> watch::Receiver<Vec<Document>> {
        let (sender, receiver) = watch::channel(vec![]);
        let remote = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(remote.poll.max(MIN_POLL));
            let mut first = true;
            loop {
                tokio::select! {
                    _ = sender.closed() => break,
                    _ = interval.tick() => {}
                }

                match remote.list().await {
                    Ok(documents) if first => {
                        first = false;
                        sender.send_replace(documents);
                    }
                    Ok(documents) => {
                        sender.send_if_modified(|current| {
                            let modified = *current != documents;
                            if modified {
                                *current = documents;
                            }
                            modified
                        });
                    }
                    Err(e) => warn!("Failed to poll {}: {}", remote.collection_url, e),
                }
            }
            debug!("Stopped watching {}", remote.collection_url);
        });

        receiver
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::json;
    use tokio::time::timeout;
    use wiremock::{
        matchers::{body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::{error::Error, post::Post};

    fn remote(server: &MockServer) -> HttpRemote {
        HttpRemote::with_client(
            HttpClient::with_limits(2, 0),
            &server.uri(),
            "POSTS",
            Duration::from_millis(100),
        )
    }

    fn document(id: &str) -> Document {
        Document::from_post(&Post::new(id, "Fire", "near park"))
    }

    fn listing(ids: &[&str]) -> ResponseTemplate {
        let documents: Vec<_> = ids.iter().map(|id| document(id)).collect();
        ResponseTemplate::new(200).set_body_json(json!({ "documents": documents }))
    }

    #[test]
    fn urls_are_encoded() {
        let remote = HttpRemote::with_client(
            HttpClient::with_limits(1, 0),
            "http://localhost:8080/v1/",
            "POSTS",
            Duration::from_secs(1),
        );
        assert_eq!(remote.collection_url, "http://localhost:8080/v1/POSTS");
        assert_eq!(
            remote.document_url("17-a@x.com"),
            "http://localhost:8080/v1/POSTS/17-a%40x.com"
        );
    }

    #[tokio::test]
    async fn missing_documents_do_not_exist() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/POSTS/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/POSTS/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document("1")))
            .mount(&server)
            .await;

        let remote = remote(&server);
        assert!(!remote.exists("missing").await.unwrap());
        assert!(remote.exists("1").await.unwrap());
    }

    #[tokio::test]
    async fn set_puts_and_merge_patches() {
        let server = MockServer::start().await;
        let document = document("1");
        Mock::given(method("PUT"))
            .and(path("/POSTS/1"))
            .and(body_json(&document))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/POSTS/1"))
            .and(body_json(&document))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let remote = remote(&server);
        remote.set(&document).await.unwrap();
        remote.merge(&document).await.unwrap();
    }

    #[tokio::test]
    async fn list_reads_documents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/POSTS"))
            .respond_with(listing(&["1", "2"]))
            .mount(&server)
            .await;

        let documents = remote(&server).list().await.unwrap();
        let ids: Vec<_> = documents.iter().map(|document| document.id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
        assert_eq!(documents[0].decode(), Some(Post::new("1", "Fire", "near park")));
    }

    #[tokio::test]
    async fn failed_requests_report_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let remote = remote(&server);
        assert!(matches!(
            remote.list().await,
            Err(Error::Status { status, .. }) if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert!(matches!(remote.exists("1").await, Err(Error::Status { .. })));
    }

    #[tokio::test]
    async fn watch_publishes_only_changes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/POSTS"))
            .respond_with(listing(&["1"]))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/POSTS"))
            .respond_with(listing(&["1", "2"]))
            .mount(&server)
            .await;

        let mut changes = remote(&server).watch();
        timeout(Duration::from_secs(5), async {
            changes.changed().await.unwrap();
            assert_eq!(changes.borrow_and_update().len(), 1);
            // the repeated single-document listings are not republished
            changes.changed().await.unwrap();
            assert_eq!(changes.borrow_and_update().len(), 2);
        })
        .await
        .expect("watch never published");
    }
}
