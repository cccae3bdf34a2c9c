//! # Operator Bootstrap
//!
//! Builds every collaborator from an [`OperatorConfig`] and hands them to [`Operator::new`].
//! All of this runs once at startup; any failure here is a startup failure and the
//! operator never enters its event loop.

use std::sync::Arc;
use tracing::info;

use super::{Operator, OperatorComponents, OperatorStats};
use crate::aggregator::JsonRpcAggregatorClient;
use crate::chain::rpc::ChainClient;
use crate::chain::{PollingTaskSubscriber, RpcOperatorRegistry};
use crate::config::OperatorConfig;
use crate::delegate::HttpTaskDelegate;
use crate::error::Result;
use crate::identity::keystore::load_signing_key;
use crate::identity::IdentityContext;
use crate::signer::KeypairSigner;
use crate::subscription::SubscriptionManager;

pub struct OperatorBootstrap;

impl OperatorBootstrap {
    /// Unlock the signing key, resolve the operator id and wire up the event loop
    pub async fn from_config(config: &OperatorConfig) -> Result<Operator> {
        info!("🚀 BOOTSTRAP: Starting operator bootstrap");

        config.validate()?;
        let operator_address = config.operator.operator_address()?;

        let keypair = load_signing_key(
            &config.operator.signing_key_path,
            &config.operator.signing_key_password_env,
        )?;
        info!(
            public_key = %keypair.public_key(),
            "✅ BOOTSTRAP: Signing key unlocked"
        );

        let chain = ChainClient::new(&config.chain.rpc_url, config.chain.request_timeout())?;
        let registry = Arc::new(RpcOperatorRegistry::new(
            chain.clone(),
            config.chain.registry_coordinator()?,
        ));

        let identity =
            Arc::new(IdentityContext::resolve(operator_address, keypair, registry.as_ref()).await?);
        info!(
            operator_id = %identity.operator_id(),
            "✅ BOOTSTRAP: Operator identity resolved"
        );

        let subscriber = Arc::new(PollingTaskSubscriber::new(
            chain,
            config.chain.task_manager()?,
            config
                .chain
                .subscriber_config(config.subscription.event_buffer_size),
        ));
        let subscriptions =
            SubscriptionManager::new(subscriber, config.subscription.resubscribe_policy());

        let delegate = Arc::new(HttpTaskDelegate::new(config.delegate.http_config())?);
        let signer = Arc::new(
            KeypairSigner::new(Arc::clone(&identity))
                .with_max_payload_bytes(config.signer.max_payload_bytes),
        );
        let aggregator = Arc::new(JsonRpcAggregatorClient::new(
            &config.aggregator.url,
            config.aggregator.timeout(),
        )?);

        let operator = Operator::new(OperatorComponents {
            identity,
            registry,
            subscriptions,
            delegate,
            signer,
            aggregator,
            max_in_flight: config.aggregator.max_in_flight,
            stats: Arc::new(OperatorStats::new()),
        });

        info!("🎉 BOOTSTRAP: Operator bootstrap completed successfully");
        Ok(operator)
    }
}
