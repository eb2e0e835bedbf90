//! Api command implementation.

use sitecluster_sched::API_VERSIONS;

/// Print every supported API version.
pub fn execute() {
    for version in API_VERSIONS {
        println!("{version}");
    }
}
