use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for one [`ActorRoom`](crate::ActorRoom).
///
/// Games override the defaults through `GameLogic::room_config()`; missing
/// fields in a serialized config fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Seats, counting disconnected occupants still inside their grace
    /// period. A full room refuses joins with `RoomFull`, which sends the
    /// RTP matcher on to the next candidate.
    pub max_players: usize,

    /// How long a disconnected occupant keeps their seat.
    #[serde(with = "secs")]
    pub reconnect_grace: Duration,

    /// Game tick rate in Hz. 0 means the room only reacts to commands.
    pub tick_rate: u32,

    /// Capacity of the actor's command channel.
    pub channel_size: usize,

    /// Longest one recipient may take to accept a frame. A slower
    /// recipient is disconnected so the room keeps running.
    #[serde(with = "secs")]
    pub send_timeout: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: 100,
            reconnect_grace: Duration::from_secs(30),
            tick_rate: 0,
            channel_size: 64,
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// Durations as whole seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
