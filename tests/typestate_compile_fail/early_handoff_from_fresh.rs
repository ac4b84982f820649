/// This test should FAIL to compile
/// Handing off before any setup step should be impossible

use cordon::exec::launcher::ExecLauncher;
use cordon::exec::preexec::{Sandbox, SandboxConfig};
use cordon::kernel::credentials::Identity;
use cordon::testing::RecordingKernel;

fn main() {
    let kernel = RecordingKernel::new(Identity::plain(1000, 1000));
    let sandbox = Sandbox::new(kernel, SandboxConfig::new("web", vec!["true".into()]));

    // This should fail: Fresh has no handoff method
    sandbox.handoff(&mut ExecLauncher);
}
