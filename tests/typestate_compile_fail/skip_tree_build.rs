/// This test should FAIL to compile
/// Pivoting into a tree that was never built should be impossible

use cordon::exec::preexec::{Sandbox, SandboxConfig};
use cordon::kernel::credentials::Identity;
use cordon::testing::RecordingKernel;

fn main() {
    let kernel = RecordingKernel::new(Identity::plain(1000, 1000));
    let sandbox = Sandbox::new(kernel, SandboxConfig::new("web", vec!["true".into()]))
        .validate()
        .unwrap()
        .isolate()
        .unwrap();

    // This should fail: NamespaceIsolated has no switch_root method
    let _ = sandbox.switch_root();
}
