//! # Payment Worker Demo
//!
//! Runs a payment authorization worker over the in-memory broker: consumes
//! `orders.created`, publishes `payments.authorized` or `payments.rejected`,
//! and dead-letters unprocessable orders to `payments.dlq`.
//!
//! The seeded order stream includes a redelivered duplicate, a malformed
//! payload and an order that arrives with its retries already exhausted so
//! every resilience path shows up in the logs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use resilient_consumer::config::{ConfigManager, ResilienceConfig};
use resilient_consumer::constants::headers;
use resilient_consumer::logging;
use resilient_consumer::messaging::{InMemoryBroker, InboundMessage, MessagePublisher, OutboundMessage};
use resilient_consumer::processing::{BusinessError, BusinessHandler, HandlerOutput};
use resilient_consumer::worker::ConsumerSupervisor;

const ORDERS_TOPIC: &str = "orders.created";
const AUTHORIZED_TOPIC: &str = "payments.authorized";
const REJECTED_TOPIC: &str = "payments.rejected";
const DLQ_TOPIC: &str = "payments.dlq";
const SERVICE_NAME: &str = "paiement-svc";

#[derive(Parser)]
#[command(name = "payment-worker-demo")]
#[command(about = "Payment worker over an in-memory broker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Number of well-formed orders to seed
    #[arg(short, long, default_value_t = 10)]
    orders: u32,

    /// Partitions per topic
    #[arg(short, long, default_value_t = 3)]
    partitions: i32,

    /// Orders above this amount are rejected
    #[arg(long, default_value_t = 500.0)]
    approval_limit: f64,

    /// How long to consume before shutting down
    #[arg(long, default_value_t = 5)]
    run_seconds: u64,

    /// Configuration directory (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Configuration environment
    #[arg(short, long)]
    environment: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct Order {
    order_id: String,
    user_id: String,
    amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum PaymentStatus {
    Authorized,
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentEvent {
    event_id: String,
    order_id: String,
    user_id: String,
    amount: f64,
    status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejection_reason: Option<String>,
    processed_at: String,
}

/// Authorizes orders up to `approval_limit`
#[derive(Debug, Clone)]
struct PaymentHandler {
    approval_limit: f64,
}

impl PaymentHandler {
    fn authorize(&self, order: &Order) -> Result<PaymentEvent, BusinessError> {
        if !order.amount.is_finite() || order.amount <= 0.0 {
            return Err(BusinessError::new(
                "InvalidOrder",
                format!("order {} has invalid amount {}", order.order_id, order.amount),
            ));
        }

        let now = Utc::now();
        let authorized = order.amount <= self.approval_limit;
        Ok(PaymentEvent {
            event_id: format!("payment-{}-{}", order.order_id, now.timestamp_millis()),
            order_id: order.order_id.clone(),
            user_id: order.user_id.clone(),
            amount: order.amount,
            status: if authorized {
                PaymentStatus::Authorized
            } else {
                PaymentStatus::Rejected
            },
            authorization_code: authorized.then(|| format!("AUTH-{}", now.timestamp_millis())),
            rejection_reason: (!authorized).then(|| "Insufficient funds".to_string()),
            processed_at: now.to_rfc3339(),
        })
    }
}

#[async_trait]
impl BusinessHandler for PaymentHandler {
    async fn handle(
        &self,
        message: &InboundMessage,
        _attempt: u32,
    ) -> Result<HandlerOutput, BusinessError> {
        let order: Order = serde_json::from_slice(&message.value)?;
        let payment = self.authorize(&order)?;

        let (topic, event_type) = match payment.status {
            PaymentStatus::Authorized => (AUTHORIZED_TOPIC, "PaymentAuthorized"),
            PaymentStatus::Rejected => (REJECTED_TOPIC, "PaymentRejected"),
        };

        info!(
            order_id = %order.order_id,
            amount = order.amount,
            status = ?payment.status,
            destination = topic,
            "💳 Payment processed"
        );

        let event = OutboundMessage::json(topic, &payment)?
            .with_key(order.order_id.as_bytes().to_vec())
            .with_header(headers::EVENT_ID, payment.event_id.clone())
            .with_header(headers::EVENT_TYPE, event_type);
        Ok(HandlerOutput::single(event))
    }
}

fn order_record(order: &Order, event_id: &str) -> anyhow::Result<OutboundMessage> {
    Ok(OutboundMessage::json(ORDERS_TOPIC, order)?
        .with_key(order.order_id.as_bytes().to_vec())
        .with_header(headers::EVENT_ID, event_id)
        .with_header(headers::EVENT_TYPE, "OrderCreated")
        .with_header(headers::RETRY_COUNT, "0"))
}

async fn seed_orders(broker: &InMemoryBroker, count: u32, max_retries: u32) -> anyhow::Result<()> {
    for n in 0..count {
        let order = Order {
            order_id: format!("order-{n:04}"),
            user_id: format!("user-{}", n % 4),
            amount: f64::from(25 + n * 97 % 900),
        };
        broker.publish(order_record(&order, &format!("evt-order-{n:04}"))?).await?;
    }

    // Redelivery of the first order under the same event id
    if count > 0 {
        let first = Order {
            order_id: "order-0000".to_string(),
            user_id: "user-0".to_string(),
            amount: 25.0,
        };
        broker.publish(order_record(&first, "evt-order-0000")?).await?;
    }

    // Fails on every delivery until the retry budget runs out
    broker
        .publish(
            OutboundMessage::new(ORDERS_TOPIC, b"{not json".to_vec())
                .with_key(b"order-bad".to_vec())
                .with_header(headers::EVENT_ID, "evt-order-bad")
                .with_header(headers::RETRY_COUNT, "0"),
        )
        .await?;

    // Arrives already poisoned
    let poisoned = Order {
        order_id: "order-poison".to_string(),
        user_id: "user-9".to_string(),
        amount: 10.0,
    };
    broker
        .publish(
            order_record(&poisoned, "evt-order-poison")?
                .with_header(headers::RETRY_COUNT, max_retries.to_string()),
        )
        .await?;

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<ResilienceConfig> {
    let environment = cli
        .environment
        .clone()
        .unwrap_or_else(ConfigManager::detect_environment);
    let mut config = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &environment)
        .context("loading resilience configuration")?
        .config()
        .clone();

    config.consumer.service_name = SERVICE_NAME.to_string();
    config.consumer.dead_letter_topic = DLQ_TOPIC.to_string();
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_structured_logging();

    let config = load_config(&cli)?;
    let broker = InMemoryBroker::new(cli.partitions);
    broker.subscribe(ORDERS_TOPIC);
    seed_orders(&broker, cli.orders, config.consumer.max_retries).await?;

    let handler = PaymentHandler {
        approval_limit: cli.approval_limit,
    };
    let mut supervisor = ConsumerSupervisor::new(config, Arc::new(broker.clone()), Arc::new(handler))?;
    supervisor.spawn_all(broker.topic_sources(ORDERS_TOPIC))?;

    info!(
        partitions = cli.partitions,
        orders = cli.orders,
        "🚀 Payment worker demo running (Ctrl-C to stop)"
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
        }
        _ = tokio::time::sleep(Duration::from_secs(cli.run_seconds)) => {}
    }

    let totals = supervisor.total_stats();
    let dedup_size = supervisor.dedup_cache().size();
    for (assignment, result) in supervisor.shutdown_and_join().await {
        if let Err(e) = result {
            warn!(topic = %assignment.0, partition = assignment.1, error = %e, "Worker exited with error");
        }
    }

    println!("📊 Payment worker summary");
    println!("   received:        {}", totals.received);
    println!("   acked:           {}", totals.acked);
    println!("   duplicates:      {}", totals.duplicates);
    println!("   retry signaled:  {}", totals.retry_signaled);
    println!("   dead-lettered:   {}", totals.dead_lettered);
    println!("   dedup entries:   {dedup_size}");
    println!("   {AUTHORIZED_TOPIC}: {}", broker.take_published(AUTHORIZED_TOPIC).len());
    println!("   {REJECTED_TOPIC}: {}", broker.take_published(REJECTED_TOPIC).len());
    println!("   {DLQ_TOPIC}: {}", broker.take_published(DLQ_TOPIC).len());

    Ok(())
}
