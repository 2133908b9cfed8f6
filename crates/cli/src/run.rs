//! Wiring for `mqttgram run`.

use std::{path::Path, sync::Arc, time::Duration};

use {
    anyhow::{Context, Result, bail},
    mqttgram_bridge::{BackoffPolicy, BridgeController, MqttBus, Pipeline},
    mqttgram_channels::{AlertDispatcher, JsonFileSubscriberStore, SubscriberRegistry},
    mqttgram_common::SubscriberId,
    mqttgram_config::{BridgeConfig, Severity, validate},
    mqttgram_metrics::{MetricsRecorderConfig, init_metrics},
    mqttgram_telegram::{AccessPolicy, CommandHandler, TelegramOutbound, build_bot, start_polling},
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = mqttgram_config::load(config_path)?;
    check_config(&config)?;

    let _metrics = init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        listen: config.metrics.listen,
        global_labels: Vec::new(),
    })?;

    let subscribers_path = config
        .subscribers
        .path
        .clone()
        .context("subscriber file path is not configured")?;
    let registry = Arc::new(
        SubscriberRegistry::load(Arc::new(JsonFileSubscriberStore::new(&subscribers_path)))
            .await
            .with_context(|| format!("loading {}", subscribers_path.display()))?,
    );
    if let Some(admin) = config.telegram.admin_chat_id {
        match registry.seed_if_empty(SubscriberId(admin)).await {
            Ok(true) => info!(chat_id = admin, "subscribed admin chat"),
            Ok(false) => {},
            Err(e) => warn!(chat_id = admin, error = %e, "could not subscribe admin chat"),
        }
    }
    info!(
        path = %subscribers_path.display(),
        count = registry.len().await,
        "subscribers loaded"
    );

    let bot = build_bot(&config.telegram)?;
    let dispatcher = AlertDispatcher::new(
        Arc::new(TelegramOutbound::new(bot.clone())),
        Duration::from_secs(config.dispatch.timeout_secs),
    )
    .with_max_concurrent(config.dispatch.max_concurrent);

    let controller = BridgeController::new(
        MqttBus::new(&config.mqtt),
        config.mqtt.topic.clone(),
        Pipeline::new(&config.classifier),
        dispatcher,
        Arc::clone(&registry),
        BackoffPolicy::from_config(&config.backoff),
    );
    let handler = Arc::new(CommandHandler::new(
        Arc::clone(&registry),
        AccessPolicy::from_config(&config.telegram),
        controller.subscribe_state(),
    ));

    let cancel = CancellationToken::new();
    let polling = start_polling(bot, &config.telegram, handler, cancel.clone())
        .await
        .context("starting telegram bot")?;
    let bridge = tokio::spawn(controller.run(cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("shutdown requested");
    cancel.cancel();

    let grace = Duration::from_secs(config.shutdown_grace_secs);
    let bridge_abort = bridge.abort_handle();
    let polling_abort = polling.abort_handle();
    let joined = tokio::time::timeout(grace, async {
        let (bridge, polling) = tokio::join!(bridge, polling);
        for (name, result) in [("bridge", bridge), ("telegram polling", polling)] {
            if let Err(e) = result {
                error!(task = name, error = %e, "task ended abnormally");
            }
        }
    })
    .await;
    if joined.is_err() {
        warn!(
            grace_secs = config.shutdown_grace_secs,
            "shutdown grace period elapsed, abandoning in-flight work"
        );
        bridge_abort.abort();
        polling_abort.abort();
    }

    info!("mqttgram stopped");
    Ok(())
}

/// Log every diagnostic and fail on errors.
fn check_config(config: &BridgeConfig) -> Result<()> {
    let result = validate(config);
    for d in &result.diagnostics {
        match d.severity {
            Severity::Error => error!(path = d.path, env = d.env, "{}", d.message),
            Severity::Warning => warn!(path = d.path, env = d.env, "{}", d.message),
        }
    }
    if result.has_errors() {
        bail!("invalid configuration: {}", result.error_summary());
    }
    Ok(())
}
