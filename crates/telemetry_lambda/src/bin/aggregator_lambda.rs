use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};
use telemetry_lambda::adapters::object_store::AnalyticsObjectReader;
use telemetry_lambda::handlers::aggregator::{handle_storage_event, is_storage_event};

struct S3ObjectReader {
    s3_client: aws_sdk_s3::Client,
}

impl AnalyticsObjectReader for S3ObjectReader {
    fn read_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String> {
        let client = self.s3_client.clone();
        let bucket = bucket.to_string();
        let key = key.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = client
                    .get_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|error| format!("failed to read object from s3: {error}"))?;
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|error| format!("failed to collect object body: {error}"))?;
                Ok(data.into_bytes().to_vec())
            })
        })
    }
}

async fn handle_request(event: LambdaEvent<Value>) -> Result<Value, Error> {
    if !is_storage_event(&event.payload) {
        return Err(Error::from("unsupported event: expected s3 storage records"));
    }
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let reader = S3ObjectReader {
        s3_client: aws_sdk_s3::Client::new(&aws_config),
    };

    let summaries = handle_storage_event(&event.payload, &reader).map_err(Error::from)?;
    Ok(json!({ "status": "ok", "objects": summaries.len() }))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}
