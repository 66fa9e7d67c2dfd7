use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::api::{
    ApiError, ApiResponse, AuthIdentity, DeleteRequest, OAuthAccess, OAuthExchange,
    OpenDialogRequest, PostEphemeralRequest, PostMessageRequest, ResponseUrlBody,
    ResponseUrlPoster, SlackApi, UpdateRequest,
};

pub const POSTED_TS: &str = "1730000000.000100";

#[derive(Clone, Debug, PartialEq)]
pub enum ApiCall {
    PostMessage(PostMessageRequest),
    PostEphemeral(PostEphemeralRequest),
    Update(UpdateRequest),
    Delete(DeleteRequest),
    OpenDialog(OpenDialogRequest),
    ExchangeCode(String),
    TestAuth,
}

#[derive(Default)]
pub struct ScriptedSlackApi {
    calls: Mutex<Vec<ApiCall>>,
    response: Option<ApiResponse>,
    failure: Option<ApiError>,
    identity: AuthIdentity,
    access: OAuthAccess,
}

impl ScriptedSlackApi {
    pub fn with_response(mut self, response: ApiResponse) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_failure(mut self, failure: ApiError) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn with_identity(mut self, identity: AuthIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_access(mut self, access: OAuthAccess) -> Self {
        self.access = access;
        self
    }

    pub async fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().await.clone()
    }

    pub async fn posts(&self) -> Vec<PostMessageRequest> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                ApiCall::PostMessage(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn dialogs(&self) -> Vec<OpenDialogRequest> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                ApiCall::OpenDialog(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, call: ApiCall, channel: &str) -> Result<ApiResponse, ApiError> {
        self.calls.lock().await.push(call);
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        Ok(self.response.clone().unwrap_or_else(|| ApiResponse {
            ok: true,
            channel: Some(channel.to_owned()),
            ts: Some(POSTED_TS.to_owned()),
            ..ApiResponse::default()
        }))
    }
}

#[async_trait]
impl SlackApi for ScriptedSlackApi {
    async fn post_message(&self, request: &PostMessageRequest) -> Result<ApiResponse, ApiError> {
        self.record(ApiCall::PostMessage(request.clone()), &request.channel).await
    }

    async fn post_ephemeral(
        &self,
        request: &PostEphemeralRequest,
    ) -> Result<ApiResponse, ApiError> {
        let mut response =
            self.record(ApiCall::PostEphemeral(request.clone()), &request.channel).await?;
        response.message_ts = response.ts.take();
        Ok(response)
    }

    async fn update(&self, request: &UpdateRequest) -> Result<ApiResponse, ApiError> {
        self.record(ApiCall::Update(request.clone()), &request.channel).await
    }

    async fn delete(&self, request: &DeleteRequest) -> Result<ApiResponse, ApiError> {
        self.record(ApiCall::Delete(request.clone()), &request.channel).await
    }

    async fn open_dialog(&self, request: &OpenDialogRequest) -> Result<ApiResponse, ApiError> {
        self.record(ApiCall::OpenDialog(request.clone()), "").await
    }

    async fn exchange_oauth_code(&self, request: &OAuthExchange) -> Result<OAuthAccess, ApiError> {
        self.calls.lock().await.push(ApiCall::ExchangeCode(request.code.clone()));
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        Ok(self.access.clone())
    }

    async fn test_auth(&self) -> Result<AuthIdentity, ApiError> {
        self.calls.lock().await.push(ApiCall::TestAuth);
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        Ok(self.identity.clone())
    }
}

#[derive(Default)]
pub struct RecordingResponseUrl {
    posts: Mutex<Vec<(String, ResponseUrlBody)>>,
    failure: Option<ApiError>,
}

impl RecordingResponseUrl {
    pub fn failing(failure: ApiError) -> Self {
        Self { posts: Mutex::default(), failure: Some(failure) }
    }

    pub async fn posts(&self) -> Vec<(String, ResponseUrlBody)> {
        self.posts.lock().await.clone()
    }
}

#[async_trait]
impl ResponseUrlPoster for RecordingResponseUrl {
    async fn post(&self, url: &str, body: &ResponseUrlBody) -> Result<(), ApiError> {
        self.posts.lock().await.push((url.to_owned(), body.clone()));
        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}
