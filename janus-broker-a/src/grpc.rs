//! Thin wrapper around `tonic`'s low-level `Grpc<Channel>` client for the
//! single server-streaming trade-events call, in place of a `.proto`-
//! generated client (§4.6).

use crate::error::BrokerAError;
use crate::pb::{SubscribeTradeEventsRequest, TradeEventPayload};
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::transport::Channel;
use tonic::{Request, Streaming};

const SUBSCRIBE_PATH: &str = "/janus.broker_a.TradeEvents/Subscribe";

pub struct TradeEventsClient {
    inner: Grpc<Channel>,
}

impl TradeEventsClient {
    pub async fn connect(endpoint: String) -> Result<Self, BrokerAError> {
        let channel = Channel::from_shared(endpoint)
            .map_err(|err| BrokerAError::BadResponse(err.to_string()))?
            .connect()
            .await
            .map_err(|err| BrokerAError::BadResponse(err.to_string()))?;
        Ok(Self {
            inner: Grpc::new(channel),
        })
    }

    pub async fn subscribe(
        &mut self,
        account_alias: String,
        region_id: String,
    ) -> Result<Streaming<TradeEventPayload>, BrokerAError> {
        self.inner.ready().await.map_err(|err| {
            BrokerAError::BadResponse(format!("trade-events channel not ready: {err}"))
        })?;
        let codec = ProstCodec::default();
        let path = tonic::codegen::http::uri::PathAndQuery::from_static(SUBSCRIBE_PATH);
        let request = Request::new(SubscribeTradeEventsRequest {
            account_alias,
            region_id,
        });
        let response = self
            .inner
            .server_streaming(request, path, codec)
            .await
            .map_err(BrokerAError::Stream)?;
        Ok(response.into_inner())
    }
}
