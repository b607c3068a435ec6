use crate::mcp::types::{ErrorObject, PingParams, PingResult};

pub async fn handle_ping(_params: PingParams) -> Result<PingResult, ErrorObject> {
    Ok(PingResult {})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_ping_success() {
        let result = handle_ping(PingParams {}).await;
        assert_eq!(result.unwrap(), PingResult {});
    }
}
