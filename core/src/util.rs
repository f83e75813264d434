use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Wall-clock now as a proto timestamp. Clocks before the epoch collapse to
/// zero rather than failing a response.
pub fn now_timestamp() -> prost_types::Timestamp {
    timestamp_from(SystemTime::now())
}

pub fn timestamp_from(time: SystemTime) -> prost_types::Timestamp {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => prost_types::Timestamp {
            seconds: elapsed.as_secs() as i64,
            nanos: elapsed.subsec_nanos() as i32,
        },
        Err(_) => prost_types::Timestamp::default(),
    }
}

/// Milliseconds since the epoch, used for element-id generation.
pub fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0)
}
