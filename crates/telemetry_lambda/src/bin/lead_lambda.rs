use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};
use telemetry_lambda::handlers::lead::{handle_queue_event, is_queue_event};

async fn handle_request(event: LambdaEvent<Value>) -> Result<Value, Error> {
    if !is_queue_event(&event.payload) {
        return Err(Error::from("unsupported event: expected sqs queue records"));
    }
    let receipts = handle_queue_event(&event.payload).map_err(Error::from)?;
    Ok(json!({ "status": "ok", "leads": receipts.len() }))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}
