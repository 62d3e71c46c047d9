//! Test helper utilities and common fixtures

use std::time::{Duration, Instant};
use tokio::time::sleep;

pub const STAFF_IDS: [&str; 5] = [
    "jmMZkSGVBbCDgKKMMSNPS",
    "HeLlOWoRlD123",
    "iKnowThatYouAreReadingThis",
    "PyTHonDIscorDCoDEJam",
    "iWAShereWRITINGthis",
];

pub const SPECIALTIES: [&str; 5] = ["pasta", "meat", "vegetables", "non-food", "dessert"];

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    pub async fn wait_for<F>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> bool,
    {
        let start = Instant::now();

        while start.elapsed() < timeout {
            if condition() {
                return true;
            }
            sleep(Duration::from_millis(2)).await;
        }

        condition()
    }
}
