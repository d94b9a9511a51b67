//! Resolves a video id to its master playlist through the platform's GraphQL API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Result, VodError};

const GQL_API_URL: &str = "https://gql.twitch.tv/gql";
const USHER_VOD_URL: &str = "https://usher.ttvnw.net/vod";
const CLIENT_ID: &str = "kimne78kx3ncx6brgo4mv6wki5h1ko";
const PLAYBACK_ACCESS_TOKEN_HASH: &str =
    "ed230aa1e33e07eebb8928504583da78a5173989fadfb1ac94be06a04f3cdbe9";

/// Signed token authorizing playlist access for one video.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlaybackAccessToken {
    pub value: String,
    pub signature: String,
}

/// A playlist body together with the URL it was served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPlaylist {
    pub url: Url,
    pub text: String,
}

#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn playback_access_token(
        &self,
        video_id: &str,
        oauth: Option<&str>,
    ) -> Result<PlaybackAccessToken>;

    async fn variant_playlist(
        &self,
        video_id: &str,
        token: &PlaybackAccessToken,
    ) -> Result<FetchedPlaylist>;
}

#[derive(Deserialize)]
struct GqlResponse {
    data: Option<GqlData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlData {
    video_playback_access_token: Option<PlaybackAccessToken>,
}

pub struct TwitchGqlSource {
    client: Client,
}

impl TwitchGqlSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn access_token_query(video_id: &str) -> serde_json::Value {
        serde_json::json!({
            "operationName": "PlaybackAccessToken",
            "extensions": {
                "persistedQuery": {
                    "version": 1,
                    "sha256Hash": PLAYBACK_ACCESS_TOKEN_HASH,
                }
            },
            "variables": {
                "isLive": false,
                "login": "",
                "isVod": true,
                "vodID": video_id,
                "playerType": "embed",
                "platform": "web",
            },
        })
    }

    pub fn usher_url(video_id: &str, token: &PlaybackAccessToken) -> Result<Url> {
        Url::parse_with_params(
            &format!("{USHER_VOD_URL}/{video_id}.m3u8"),
            &[
                ("nauth", token.value.as_str()),
                ("nauthsig", token.signature.as_str()),
                ("allow_source", "true"),
                ("player", "twitchweb"),
            ],
        )
        .map_err(|e| VodError::invalid_url(video_id, e.to_string()))
    }
}

#[async_trait]
impl ManifestSource for TwitchGqlSource {
    #[instrument(skip(self, oauth), err)]
    async fn playback_access_token(
        &self,
        video_id: &str,
        oauth: Option<&str>,
    ) -> Result<PlaybackAccessToken> {
        let mut request = self
            .client
            .post(GQL_API_URL)
            .header("Client-Id", CLIENT_ID)
            .json(&Self::access_token_query(video_id));
        if let Some(token) = oauth.filter(|t| !t.is_empty()) {
            request = request.header(reqwest::header::AUTHORIZATION, format!("OAuth {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| VodError::manifest(format!("access token request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(VodError::manifest(format!(
                "access token request returned HTTP {status}"
            )));
        }

        let body: GqlResponse = response
            .json()
            .await
            .map_err(|e| VodError::manifest(format!("malformed access token response: {e}")))?;

        let token = body
            .data
            .and_then(|d| d.video_playback_access_token)
            .ok_or_else(|| {
                VodError::manifest(format!(
                    "no playback access token for video {video_id}; it may be private or deleted"
                ))
            })?;
        debug!("Obtained playback access token");
        Ok(token)
    }

    #[instrument(skip(self, token), err)]
    async fn variant_playlist(
        &self,
        video_id: &str,
        token: &PlaybackAccessToken,
    ) -> Result<FetchedPlaylist> {
        let url = Self::usher_url(video_id, token)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| VodError::manifest(format!("variant playlist request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(VodError::manifest(format!(
                "variant playlist request returned HTTP {status}"
            )));
        }
        let url = response.url().clone();
        let text = response
            .text()
            .await
            .map_err(|e| VodError::manifest(format!("failed to read variant playlist: {e}")))?;
        Ok(FetchedPlaylist { url, text })
    }
}
