/// This test should FAIL to compile
/// Dropping privileges before the root switch should be impossible

use cordon::exec::preexec::{Sandbox, SandboxConfig};
use cordon::kernel::credentials::Identity;
use cordon::testing::RecordingKernel;

fn main() {
    let kernel = RecordingKernel::new(Identity::plain(1000, 1000));
    let sandbox = Sandbox::new(kernel, SandboxConfig::new("web", vec!["true".into()]))
        .validate()
        .unwrap()
        .isolate()
        .unwrap()
        .build_tree()
        .unwrap();

    // This should fail: TreeBuilt has no drop_privileges method
    let _ = sandbox.drop_privileges();
}
