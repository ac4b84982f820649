/// This test should FAIL to compile
/// Attempting to reuse a state after it has been consumed

use cordon::exec::preexec::{Sandbox, SandboxConfig};
use cordon::kernel::credentials::Identity;
use cordon::testing::RecordingKernel;

fn main() {
    let kernel = RecordingKernel::new(Identity::plain(1000, 1000));
    let sandbox = Sandbox::new(kernel, SandboxConfig::new("web", vec!["true".into()]));

    // First transition consumes sandbox
    let _validated = sandbox.validate();

    // This should fail: sandbox was moved and can no longer be used
    let _again = sandbox.validate();
}
