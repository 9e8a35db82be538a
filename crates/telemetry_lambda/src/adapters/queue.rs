/// Submission seam for the ordered, deduplicating lead queue.
pub trait LeadQueueClient {
    fn send_message(&self, group_key: &str, body: &str) -> Result<(), String>;
}
