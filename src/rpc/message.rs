use serde::{Deserialize, Serialize};

/// Request body of the AppendLog RPC: one record's payload, exactly as the
/// host submitted it on the leader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendLogRequest {
    pub log_data: Vec<u8>,
}

/// Reply body of the AppendLog RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendLogResponse {
    pub success: bool,
}

impl AppendLogRequest {
    /// Serialize for a wire transport using bincode.
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("AppendLogRequest serialization should not fail")
    }

    /// Deserialize from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

impl AppendLogResponse {
    /// Serialize for a wire transport using bincode.
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("AppendLogResponse serialization should not fail")
    }

    /// Deserialize from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format_carries_payload() {
        let request = AppendLogRequest {
            log_data: b"hi".to_vec(),
        };
        let decoded = AppendLogRequest::decode(&request.encode()).unwrap();
        assert_eq!(decoded.log_data, b"hi");

        let response = AppendLogResponse { success: true };
        assert!(AppendLogResponse::decode(&response.encode()).unwrap().success);
    }
}
