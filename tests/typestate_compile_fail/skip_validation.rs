/// This test should FAIL to compile
/// Entering namespaces without validating the input should be impossible

use cordon::exec::preexec::{Sandbox, SandboxConfig};
use cordon::kernel::credentials::Identity;
use cordon::testing::RecordingKernel;

fn main() {
    let kernel = RecordingKernel::new(Identity::plain(1000, 1000));
    let sandbox = Sandbox::new(kernel, SandboxConfig::new("web", vec!["true".into()]));

    // This should fail: Fresh has no isolate method
    let _ = sandbox.isolate();
}
