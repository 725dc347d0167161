use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, COOKIE};
use reqwest::{Body, Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::{Download, RemoteApi, UploadBody, check_password};
use crate::error::ApiError;
use crate::session::Session;
use crate::share::ShareLink;
use crate::types::{DownloadSource, EntryRef, FolderListing, RemoteId, ShareInfo, TransferLink};

/// Where the local API gateway for the drive listens by default.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8787";

/// [`RemoteApi`] over the drive's JSON gateway.
///
/// Metadata calls go to the gateway; file bytes move through the direct
/// transfer links it hands out.
#[derive(Clone)]
pub struct HttpRemoteApi {
    http: Client,
    base_url: Url,
}

#[derive(Debug, Serialize)]
struct NewFolder<'a> {
    parent_id: &'a RemoteId,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct RenameBody<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct PasswordBody<'a> {
    password: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DescriptionBody<'a> {
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct MoveBody<'a> {
    folder_id: &'a RemoteId,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: RemoteId,
}

impl HttpRemoteApi {
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, ApiError> {
        Self::with_http(Client::new(), base_url)
    }

    pub fn with_http(http: Client, base_url: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn share_endpoint(&self, segments: &[&str], link: &ShareLink) -> Result<Url, ApiError> {
        let mut url = self.endpoint(segments)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("url", link.url().as_str());
            if let Some(password) = link.password() {
                query.append_pair("pwd", password);
            }
        }
        Ok(url)
    }

    fn request(&self, session: &Session, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        if session.is_anonymous() {
            builder
        } else {
            builder.header(COOKIE, session.cookie())
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: Response,
    ) -> Result<T, ApiError> {
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, body))
        }
    }
}

impl RemoteApi for HttpRemoteApi {
    async fn list_folder(
        &self,
        session: &Session,
        folder: &RemoteId,
    ) -> Result<FolderListing, ApiError> {
        let url = self.endpoint(&["v1", "folders", folder.as_str()])?;
        let response = self.request(session, Method::GET, url).send().await?;
        Self::handle_response(response).await
    }

    async fn create_folder(
        &self,
        session: &Session,
        parent: &RemoteId,
        name: &str,
        description: Option<&str>,
    ) -> Result<RemoteId, ApiError> {
        let url = self.endpoint(&["v1", "folders"])?;
        let response = self
            .request(session, Method::POST, url)
            .json(&NewFolder {
                parent_id: parent,
                name,
                description,
            })
            .send()
            .await?;
        let created: Created = Self::handle_response(response).await?;
        tracing::debug!(parent = %parent, name, id = %created.id, "folder created");
        Ok(created.id)
    }

    async fn rename(
        &self,
        session: &Session,
        target: &EntryRef,
        new_name: &str,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["v1", target.kind.collection(), target.id.as_str()])?;
        let response = self
            .request(session, Method::PATCH, url)
            .json(&RenameBody { name: new_name })
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn delete(&self, session: &Session, target: &EntryRef) -> Result<(), ApiError> {
        let url = self.endpoint(&["v1", target.kind.collection(), target.id.as_str()])?;
        let response = self.request(session, Method::DELETE, url).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn set_password(
        &self,
        session: &Session,
        target: &EntryRef,
        password: Option<&str>,
    ) -> Result<(), ApiError> {
        let password = password.filter(|code| !code.is_empty());
        check_password(target.kind, password.unwrap_or_default())?;
        let url = self.endpoint(&[
            "v1",
            target.kind.collection(),
            target.id.as_str(),
            "password",
        ])?;
        let response = self
            .request(session, Method::PUT, url)
            .json(&PasswordBody { password })
            .send()
            .await?;
        Self::check_status(response).await?;
        tracing::debug!(id = %target.id, protected = password.is_some(), "extraction code updated");
        Ok(())
    }

    async fn set_description(
        &self,
        session: &Session,
        target: &EntryRef,
        description: &str,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["v1", target.kind.collection(), target.id.as_str()])?;
        let response = self
            .request(session, Method::PATCH, url)
            .json(&DescriptionBody { description })
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn move_entry(
        &self,
        session: &Session,
        target: &EntryRef,
        destination: &RemoteId,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&[
            "v1",
            target.kind.collection(),
            target.id.as_str(),
            "move",
        ])?;
        let response = self
            .request(session, Method::POST, url)
            .json(&MoveBody {
                folder_id: destination,
            })
            .send()
            .await?;
        Self::check_status(response).await?;
        tracing::debug!(id = %target.id, destination = %destination, "entry moved");
        Ok(())
    }

    async fn resolve_share_link(
        &self,
        session: &Session,
        link: &ShareLink,
    ) -> Result<ShareInfo, ApiError> {
        let url = self.share_endpoint(&["v1", "share"], link)?;
        let response = self.request(session, Method::GET, url).send().await?;
        Self::handle_response(response).await
    }

    async fn upload(
        &self,
        session: &Session,
        folder: &RemoteId,
        file_name: &str,
        size: u64,
        body: UploadBody,
    ) -> Result<RemoteId, ApiError> {
        let mut url = self.endpoint(&["v1", "folders", folder.as_str(), "upload"])?;
        url.query_pairs_mut()
            .append_pair("name", file_name)
            .append_pair("size", &size.to_string());
        let response = self.request(session, Method::GET, url).send().await?;
        let link: TransferLink = Self::handle_response(response).await?;

        // Links that only carry the default read method are written with PUT.
        let method = match Method::from_bytes(link.method.to_ascii_uppercase().as_bytes()) {
            Ok(method) if method != Method::GET => method,
            _ => Method::PUT,
        };
        tracing::debug!(folder = %folder, file_name, size, %method, "uploading");
        let response = self
            .http
            .request(method, link.href)
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(body))
            .send()
            .await?;
        let created: Created = Self::handle_response(response).await?;
        Ok(created.id)
    }

    async fn download(
        &self,
        session: &Session,
        source: &DownloadSource,
    ) -> Result<Download, ApiError> {
        let url = match source {
            DownloadSource::File(id) => self.endpoint(&["v1", "files", id.as_str(), "download"])?,
            DownloadSource::Share(link) => self.share_endpoint(&["v1", "share", "download"], link)?,
        };
        let response = self.request(session, Method::GET, url).send().await?;
        let link: TransferLink = Self::handle_response(response).await?;

        // Direct links point at the file host, which never sees the session cookie.
        let response = self.http.get(link.href).send().await?;
        let response = Self::check_status(response).await?;
        let size = link.size.or_else(|| response.content_length());
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ApiError::from))
            .boxed();
        Ok(Download {
            file_name: link.name,
            size,
            body,
        })
    }
}
