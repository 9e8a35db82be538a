/// Submission seam for the batching analytics delivery stream.
pub trait AnalyticsStreamClient {
    fn put_record(&self, data: &[u8]) -> Result<(), String>;
}
