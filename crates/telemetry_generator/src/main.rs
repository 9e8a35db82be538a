use rand::Rng;
use serde_json::json;
use telemetry_generator::sample_session_events;

fn main() -> Result<(), String> {
    let api_url = std::env::var("API_URL")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| "API_URL must be configured".to_string())?;
    let session_limit: Option<u64> = std::env::var("GENERATOR_SESSIONS")
        .ok()
        .and_then(|value| value.parse().ok());

    let client = reqwest::blocking::Client::new();
    let mut rng = rand::thread_rng();
    let mut sessions_sent = 0u64;

    loop {
        let account_id = rng.gen_range(1..=20);
        let events = sample_session_events(&mut rng, account_id, &[1, 2]);

        for envelope in &events {
            let response = client
                .post(&api_url)
                .json(envelope)
                .send()
                .map_err(|error| format!("failed to post event: {error}"))?;
            println!(
                "{}",
                json!({
                    "status": response.status().as_u16(),
                    "event": envelope.event_type(),
                    "sessionId": envelope.session_id(),
                })
            );
        }

        eprintln!(
            "{}",
            json!({
                "component": "generator",
                "event": "session_sent",
                "details": { "accountId": account_id, "events": events.len() },
            })
        );

        sessions_sent += 1;
        if let Some(limit) = session_limit {
            if sessions_sent >= limit {
                return Ok(());
            }
        }
    }
}
