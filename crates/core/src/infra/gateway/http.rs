use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use super::{order_links, validate_submission, validate_translation, BackendGateway, GatewayError};
use crate::domain::error::AppError;
use crate::domain::types::{
    BackendStatus, ContextArtifact, Credential, DownloadLink, ExportedFile, JobSource,
    PollResponse, SubmitOutcome, UploadReceipt,
};

/// バックエンドのエンドポイントパス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub submit_upload: String,
    pub submit_url: String,
    pub submit_page: String,
    /// メディアを外部ストレージへ置き、`file_url` を受け取る（multipart）
    pub upload_media: String,
    /// `file_url` を指定してジョブを投入する
    pub process_drive_file: String,
    /// `{status}/{job_id}?apiKey=...`
    pub status: String,
    pub translate: String,
    pub resolve_links: String,
    pub export_subtitle: String,
    pub upload_to_storage: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            submit_upload: "/start-transcription".to_string(),
            submit_url: "/start-transcription-from-url".to_string(),
            submit_page: "/start-transcription-from-page".to_string(),
            upload_media: "/upload-to-drive".to_string(),
            process_drive_file: "/process-drive-file".to_string(),
            status: "/transcription-status".to_string(),
            translate: "/translate".to_string(),
            resolve_links: "/resolve-download-links".to_string(),
            export_subtitle: "/export-subtitle".to_string(),
            upload_to_storage: "/upload-to-drive".to_string(),
        }
    }
}

/// reqwest を使った HTTP ゲートウェイ
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    endpoints: Endpoints,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitUrlRequest<'a> {
    url: &'a str,
    api_key: &'a str,
    language: &'a str,
}

#[derive(Serialize)]
struct ProcessStoredFileRequest<'a> {
    #[serde(rename = "apiKey")]
    api_key: &'a str,
    file_url: &'a str,
    language: &'a str,
}

#[derive(Serialize)]
struct ResolveLinksRequest<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct TextFileRequest<'a> {
    text: &'a str,
    filename: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SubmitBody {
    #[serde(default, alias = "jobId")]
    job_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaUploadBody {
    #[serde(default, alias = "fileUrl")]
    file_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslateBody {
    #[serde(default, rename = "translatedText", alias = "translated_text")]
    translated_text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LinksBody {
    List(Vec<DownloadLink>),
    Wrapped {
        #[serde(default)]
        links: Vec<DownloadLink>,
        #[serde(default)]
        error: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
struct UploadBody {
    #[serde(default)]
    success: bool,
    #[serde(default, alias = "file_id", alias = "fileId")]
    identifier: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AppError> {
        Self::with_endpoints(base_url, Endpoints::default())
    }

    pub fn with_endpoints(
        base_url: impl Into<String>,
        endpoints: Endpoints,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::internal(format!("HTTP クライアントの作成に失敗: {e}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            endpoints,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// メディアをストレージへアップロードし、発行されたファイル URL を返す
    async fn upload_media(
        &self,
        file_name: &str,
        bytes: &[u8],
        mime: Option<&str>,
    ) -> Result<String, GatewayError> {
        let form = Form::new().part("file", file_part(file_name, bytes, mime)?);
        let response = self
            .client
            .post(self.url(&self.endpoints.upload_media))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        let (status, body) = Self::read(response).await?;
        parse_media_upload(status, &body)
    }

    async fn read(response: reqwest::Response) -> Result<(u16, Vec<u8>), GatewayError> {
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport)?;
        Ok((status, body.to_vec()))
    }
}

fn transport(e: reqwest::Error) -> GatewayError {
    GatewayError::Transport(e.to_string())
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// 非 2xx 応答からユーザー向けメッセージを取り出す。
/// JSON でなければ本文をそのまま（前後の空白のみ除去）返す。
fn error_message(status: u16, body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        if let Some(msg) = parsed.error.or(parsed.detail) {
            return msg;
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        format!("HTTP {status}")
    } else {
        text.to_string()
    }
}

fn backend_failure(status: u16, body: &[u8]) -> GatewayError {
    GatewayError::Backend {
        status: Some(status),
        message: error_message(status, body),
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::backend(format!("応答の解析に失敗しました: {e}")))
}

pub(crate) fn parse_submit(status: u16, body: &[u8]) -> Result<SubmitOutcome, GatewayError> {
    if !is_success(status) {
        return Err(backend_failure(status, body));
    }
    let parsed: SubmitBody = decode(body)?;
    if let Some(msg) = parsed.error {
        return Err(GatewayError::Backend {
            status: Some(status),
            message: msg,
        });
    }
    if let Some(job_id) = parsed.job_id.filter(|id| !id.trim().is_empty()) {
        return Ok(SubmitOutcome::Accepted { job_id });
    }
    match (parsed.status.as_deref().map(BackendStatus::parse), parsed.result) {
        (Some(BackendStatus::Done), Some(result)) => Ok(SubmitOutcome::Completed { result }),
        _ => Err(GatewayError::backend(
            "ジョブ ID も結果も含まない応答を受信しました",
        )),
    }
}

pub(crate) fn parse_media_upload(status: u16, body: &[u8]) -> Result<String, GatewayError> {
    if !is_success(status) {
        return Err(backend_failure(status, body));
    }
    let parsed: MediaUploadBody = decode(body)?;
    if let Some(msg) = parsed.error {
        return Err(GatewayError::Backend {
            status: Some(status),
            message: msg,
        });
    }
    parsed
        .file_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| GatewayError::backend("ファイル URL を含まない応答を受信しました"))
}

pub(crate) fn parse_status(status: u16, body: &[u8]) -> Result<PollResponse, GatewayError> {
    let parsed: StatusBody = if is_success(status) {
        decode(body)?
    } else {
        // 非 2xx でも status を含む本文はジョブの状態として扱う
        match serde_json::from_slice::<StatusBody>(body) {
            Ok(parsed) if parsed.status.is_some() => parsed,
            _ => return Err(backend_failure(status, body)),
        }
    };
    let raw = match parsed.status {
        Some(raw) => raw,
        // status なしで error のみ → 失敗扱い
        None if parsed.error.is_some() => "error".to_string(),
        None => {
            return Err(GatewayError::backend(
                "status を含まない応答を受信しました",
            ))
        }
    };
    Ok(PollResponse {
        status: BackendStatus::parse(&raw),
        result: parsed.result,
        error_message: parsed.error,
    })
}

pub(crate) fn parse_translation(status: u16, body: &[u8]) -> Result<String, GatewayError> {
    if !is_success(status) {
        return Err(backend_failure(status, body));
    }
    let parsed: TranslateBody = decode(body)?;
    match (parsed.translated_text, parsed.error) {
        (_, Some(msg)) => Err(GatewayError::Backend {
            status: Some(status),
            message: msg,
        }),
        (Some(text), None) => Ok(text),
        (None, None) => Err(GatewayError::backend("翻訳結果が空です")),
    }
}

pub(crate) fn parse_links(status: u16, body: &[u8]) -> Result<Vec<DownloadLink>, GatewayError> {
    if !is_success(status) {
        return Err(backend_failure(status, body));
    }
    let links = match decode::<LinksBody>(body)? {
        LinksBody::List(links) => links,
        LinksBody::Wrapped {
            error: Some(msg), ..
        } => {
            return Err(GatewayError::Backend {
                status: Some(status),
                message: msg,
            })
        }
        LinksBody::Wrapped { links, .. } => links,
    };
    order_links(links)
}

pub(crate) fn parse_upload(status: u16, body: &[u8]) -> Result<UploadReceipt, GatewayError> {
    if !is_success(status) {
        return Err(backend_failure(status, body));
    }
    let parsed: UploadBody = decode(body)?;
    if let Some(msg) = parsed.error {
        return Err(GatewayError::Backend {
            status: Some(status),
            message: msg,
        });
    }
    if !parsed.success {
        return Err(GatewayError::backend("アップロードに失敗しました"));
    }
    Ok(UploadReceipt {
        identifier: parsed.identifier,
    })
}

/// `Content-Disposition` からファイル名を取り出す
pub(crate) fn file_name_from_disposition(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn file_part(file_name: &str, bytes: &[u8], mime: Option<&str>) -> Result<Part, GatewayError> {
    let part = Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
    match mime {
        Some(m) => part
            .mime_str(m)
            .map_err(|e| GatewayError::Validation(format!("MIME タイプが不正です: {e}"))),
        None => Ok(part),
    }
}

#[async_trait]
impl BackendGateway for HttpGateway {
    async fn submit_job(
        &self,
        source: &JobSource,
        credential: &Credential,
        language: &str,
    ) -> Result<SubmitOutcome, GatewayError> {
        validate_submission(source, credential)?;

        let request = match source {
            JobSource::Upload {
                file_name,
                bytes,
                mime,
            } => {
                let form = Form::new()
                    .part("file", file_part(file_name, bytes, mime.as_deref())?)
                    .text("apiKey", credential.expose().to_string())
                    .text("language", language.to_string());
                self.client
                    .post(self.url(&self.endpoints.submit_upload))
                    .multipart(form)
            }
            JobSource::DirectUrl(url) | JobSource::PageUrl(url) => {
                let path = if matches!(source, JobSource::PageUrl(_)) {
                    &self.endpoints.submit_page
                } else {
                    &self.endpoints.submit_url
                };
                self.client.post(self.url(path)).json(&SubmitUrlRequest {
                    url: url.trim(),
                    api_key: credential.expose(),
                    language,
                })
            }
            JobSource::StorageUpload {
                file_name,
                bytes,
                mime,
            } => {
                let file_url = self.upload_media(file_name, bytes, mime.as_deref()).await?;
                log::debug!("ストレージへのアップロード完了: {file_name}");
                self.client
                    .post(self.url(&self.endpoints.process_drive_file))
                    .json(&ProcessStoredFileRequest {
                        api_key: credential.expose(),
                        file_url: &file_url,
                        language,
                    })
            }
        };

        log::debug!("ジョブ投入: {:?} → {}", source.kind(), self.base_url);
        let response = request.send().await.map_err(transport)?;
        let (status, body) = Self::read(response).await?;
        parse_submit(status, &body)
    }

    async fn poll_status(
        &self,
        job_id: &str,
        credential: &Credential,
    ) -> Result<PollResponse, GatewayError> {
        let mut url = reqwest::Url::parse(&self.url(&self.endpoints.status))
            .map_err(|e| GatewayError::Validation(format!("URL が不正です: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Validation("ベース URL にパスを追加できません".to_string()))?
            .push(job_id);

        let response = self
            .client
            .get(url)
            .query(&[("apiKey", credential.expose())])
            .send()
            .await
            .map_err(transport)?;
        let (status, body) = Self::read(response).await?;
        parse_status(status, &body)
    }

    async fn submit_translation(
        &self,
        text: &str,
        target_language: &str,
        credential: &Credential,
        context: Option<&ContextArtifact>,
    ) -> Result<String, GatewayError> {
        validate_translation(text, target_language, credential)?;

        let mut form = Form::new()
            .text("text", text.to_string())
            .text("targetLanguage", target_language.to_string())
            .text("apiKey", credential.expose().to_string());
        if let Some(ctx) = context {
            form = form.part(
                "context",
                file_part(&ctx.file_name, &ctx.bytes, ctx.mime.as_deref())?,
            );
        }

        let response = self
            .client
            .post(self.url(&self.endpoints.translate))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        let (status, body) = Self::read(response).await?;
        parse_translation(status, &body)
    }

    async fn resolve_download_links(&self, url: &str) -> Result<Vec<DownloadLink>, GatewayError> {
        if url.trim().is_empty() {
            return Err(GatewayError::Validation("URL が指定されていません".to_string()));
        }
        let response = self
            .client
            .post(self.url(&self.endpoints.resolve_links))
            .json(&ResolveLinksRequest { url: url.trim() })
            .send()
            .await
            .map_err(transport)?;
        let (status, body) = Self::read(response).await?;
        parse_links(status, &body)
    }

    async fn export_subtitle(
        &self,
        text: &str,
        file_name: &str,
    ) -> Result<ExportedFile, GatewayError> {
        let response = self
            .client
            .post(self.url(&self.endpoints.export_subtitle))
            .json(&TextFileRequest {
                text,
                filename: file_name,
            })
            .send()
            .await
            .map_err(transport)?;

        let disposition = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(file_name_from_disposition);
        let (status, body) = Self::read(response).await?;
        if !is_success(status) {
            return Err(backend_failure(status, &body));
        }
        Ok(ExportedFile {
            file_name: disposition.unwrap_or_else(|| file_name.to_string()),
            bytes: body,
        })
    }

    async fn upload_to_storage(
        &self,
        text: &str,
        file_name: &str,
    ) -> Result<UploadReceipt, GatewayError> {
        let response = self
            .client
            .post(self.url(&self.endpoints.upload_to_storage))
            .json(&TextFileRequest {
                text,
                filename: file_name,
            })
            .send()
            .await
            .map_err(transport)?;
        let (status, body) = Self::read(response).await?;
        parse_upload(status, &body)
    }

    fn name(&self) -> &str {
        "http"
    }
}
