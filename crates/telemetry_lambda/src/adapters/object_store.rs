/// Read seam for landed analytics objects.
pub trait AnalyticsObjectReader {
    fn read_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String>;
}
