/// This test should FAIL to compile
/// Handing off while still holding the setup privileges should be impossible

use cordon::exec::launcher::ExecLauncher;
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
        .unwrap()
        .switch_root()
        .unwrap();

    // This should fail: RootSwitched has no handoff method
    sandbox.handoff(&mut ExecLauncher);
}
