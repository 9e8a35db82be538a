use aws_sdk_firehose::primitives::Blob;
use aws_sdk_firehose::types::Record;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use telemetry_lambda::adapters::queue::LeadQueueClient;
use telemetry_lambda::adapters::stream::AnalyticsStreamClient;
use telemetry_lambda::handlers::ingest::{handle_ingest_event, ApiGatewayResponse, IngestTargets};

struct SqsLeadQueueClient {
    sqs_client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl LeadQueueClient for SqsLeadQueueClient {
    fn send_message(&self, group_key: &str, body: &str) -> Result<(), String> {
        let client = self.sqs_client.clone();
        let queue_url = self.queue_url.clone();
        let group = group_key.to_string();
        let message_body = body.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .send_message()
                    .queue_url(queue_url)
                    .message_group_id(group)
                    .message_body(message_body)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to enqueue lead message: {error}"))
            })
        })
    }
}

struct FirehoseStreamClient {
    firehose_client: aws_sdk_firehose::Client,
    delivery_stream_name: String,
}

impl AnalyticsStreamClient for FirehoseStreamClient {
    fn put_record(&self, data: &[u8]) -> Result<(), String> {
        let client = self.firehose_client.clone();
        let delivery_stream_name = self.delivery_stream_name.clone();
        let record = Record::builder()
            .data(Blob::new(data.to_vec()))
            .build()
            .map_err(|error| format!("failed to build stream record: {error}"))?;

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .put_record()
                    .delivery_stream_name(delivery_stream_name)
                    .record(record)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to put analytics record: {error}"))
            })
        })
    }
}

fn required_env(name: &str) -> Result<String, Error> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| Error::from(format!("{name} must be configured")))
}

async fn handle_request(event: LambdaEvent<Value>) -> Result<ApiGatewayResponse, Error> {
    let queue_url = required_env("LEAD_QUEUE_URL")?;
    let delivery_stream_name = required_env("DELIVERY_STREAM_NAME")?;

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let queue = SqsLeadQueueClient {
        sqs_client: aws_sdk_sqs::Client::new(&aws_config),
        queue_url: queue_url.clone(),
    };
    let stream = FirehoseStreamClient {
        firehose_client: aws_sdk_firehose::Client::new(&aws_config),
        delivery_stream_name: delivery_stream_name.clone(),
    };
    let targets = IngestTargets {
        lead_queue_url: &queue_url,
        delivery_stream_name: &delivery_stream_name,
    };

    Ok(handle_ingest_event(event.payload, &targets, &queue, &stream))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}
