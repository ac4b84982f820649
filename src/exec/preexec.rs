/// Locked setup sequence.
///
/// The sequence is FIXED and strictly forward:
/// 1. validate the invocation and capture the caller's identity
/// 2. prepare the container, leave the host namespaces, stage a read-only view of `/`
/// 3. build the mount tree from the container plan
/// 4. pivot into the tree and detach the old root
/// 5. drop to the caller's identity, irreversibly
/// 6. hand off to the launcher
///
/// Each step consumes the sandbox in one state and returns it in the next, so
/// a reordered or repeated step does not compile. Any error is terminal; there
/// is no rollback because the namespace is discarded with the process.
use crate::config::plan::{Directive, MountPlan};
use crate::config::types::{CordonError, ErrorClass, MountPolicy, PrivilegeModel, Result};
use crate::config::validator::ContainerName;
use crate::exec::launcher::{LaunchRequest, Launcher};
use crate::kernel::credentials::{select_model, validate_posture, Account, Identity, PrivilegeDropper};
use crate::kernel::mount::MountTreeBuilder;
use crate::kernel::namespace::NamespaceInitializer;
use crate::kernel::ops::Kernel;
use crate::kernel::root::RootSwitcher;
use crate::observability::{AuditTrail, CorrelationIds, SecurityEventType};
use crate::safety::ContainerLayout;
use std::ffi::OsString;
use std::path::PathBuf;

/// Directory the host root is staged at, and later the new root.
pub const DEFAULT_STAGING: &str = "/tmp";

/// What the caller asked for, before anything is checked.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub container: String,
    /// Home-relative directives, applied after the base plan in this order.
    pub directives: Vec<Directive>,
    pub nx: bool,
    /// `None` picks a model from the effective uid.
    pub model: Option<PrivilegeModel>,
    pub command: Vec<OsString>,
    /// Resolved from the password database when absent.
    pub account: Option<Account>,
    pub host_root: PathBuf,
    pub staging: PathBuf,
}

impl SandboxConfig {
    pub fn new(container: impl Into<String>, command: Vec<OsString>) -> Self {
        Self {
            container: container.into(),
            directives: Vec::new(),
            nx: false,
            model: None,
            command,
            account: None,
            host_root: PathBuf::from("/"),
            staging: PathBuf::from(DEFAULT_STAGING),
        }
    }
}

/// Everything fixed by validation and carried through the remaining states.
#[derive(Debug, Clone)]
pub struct Run {
    pub identity: Identity,
    pub model: PrivilegeModel,
    pub layout: ContainerLayout,
    pub plan: MountPlan,
    pub policy: MountPolicy,
    pub initializer: NamespaceInitializer,
    pub command: Vec<OsString>,
    pub host_root: PathBuf,
    pub staging: PathBuf,
}

/// Type-state: nothing checked yet
pub struct Fresh(SandboxConfig);

/// Type-state: input validated, identity and model fixed
pub struct Validated(Run);

/// Type-state: private namespace entered, read-only baseline staged
pub struct NamespaceIsolated(Run);

/// Type-state: mount tree complete
pub struct TreeBuilt(Run);

/// Type-state: running inside the new root
pub struct RootSwitched(Run);

/// Type-state: running as the caller; only handoff remains
pub struct PrivilegeDropped(Run);

/// Sandbox setup with type-state tracking.
/// The type parameter S tracks which step comes next.
pub struct Sandbox<S, K: Kernel> {
    kernel: K,
    audit: AuditTrail,
    state: S,
}

impl<S, K: Kernel> Sandbox<S, K> {
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    fn advance<T>(self, next: impl FnOnce(S) -> T) -> Sandbox<T, K> {
        Sandbox {
            kernel: self.kernel,
            audit: self.audit,
            state: next(self.state),
        }
    }
}

/// Record a failed step on the audit trail and pass the error on.
fn reject(audit: &AuditTrail, err: CordonError) -> CordonError {
    let event = match err.class() {
        ErrorClass::Usage | ErrorClass::Validation => SecurityEventType::ValidationRejected,
        ErrorClass::Precondition => SecurityEventType::PreconditionFailed,
        ErrorClass::FatalSystem => SecurityEventType::Aborted,
    };
    audit.record(event, err.to_string());
    err
}

impl<K: Kernel> Sandbox<Fresh, K> {
    pub fn new(kernel: K, config: SandboxConfig) -> Self {
        let audit = AuditTrail::new(CorrelationIds::new(&config.container));
        audit.record(SecurityEventType::SandboxStart, "setup requested");
        Self {
            kernel,
            audit,
            state: Fresh(config),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.state.0
    }

    /// Check every input, then capture identity and settle the privilege
    /// model. Nothing on disk or in the kernel has changed when this fails.
    pub fn validate(self) -> Result<Sandbox<Validated, K>> {
        let run = match Self::resolve(&self.kernel, &self.state.0) {
            Ok(run) => run,
            Err(e) => return Err(reject(&self.audit, e)),
        };
        let audit = AuditTrail::new(
            self.audit
                .correlation()
                .clone()
                .with_real_uid(run.identity.real_uid.as_raw()),
        )
        .with_model(run.model);
        log::info!(
            "Validated container {} for {} ({} model, {} operations)",
            run.layout.name(),
            run.layout.account().name,
            run.model,
            run.plan.len()
        );
        Ok(Sandbox {
            kernel: self.kernel,
            audit,
            state: Validated(run),
        })
    }

    fn resolve(kernel: &K, config: &SandboxConfig) -> Result<Run> {
        let name = ContainerName::new(&config.container)?;
        if config.command.is_empty() {
            return Err(CordonError::Usage("missing command".to_string()));
        }

        let identity = kernel.identity()?;
        let model = select_model(config.model, &identity);
        validate_posture(&identity, model)?;

        let account = match &config.account {
            Some(account) => account.clone(),
            None => Account::lookup(&identity)?,
        };
        let layout = ContainerLayout::new(account, name);
        let plan = MountPlan::for_container(&layout, &config.directives)?;
        let policy = MountPolicy::default()
            .with_nx(config.nx)
            .with_real_access_check(model == PrivilegeModel::Setuid);

        Ok(Run {
            identity,
            model,
            layout,
            plan,
            policy,
            initializer: NamespaceInitializer::new(model),
            command: config.command.clone(),
            host_root: config.host_root.clone(),
            staging: config.staging.clone(),
        })
    }
}

impl<K: Kernel> Sandbox<Validated, K> {
    pub fn run(&self) -> &Run {
        &self.state.0
    }

    /// Prepare the container on the host, then enter private namespaces and
    /// stage the read-only baseline.
    pub fn isolate(mut self) -> Result<Sandbox<NamespaceIsolated, K>> {
        let run = &self.state.0;
        let step = run.layout.prepare(&run.host_root).and_then(|()| {
            run.initializer.isolate(&mut self.kernel, &run.identity)?;
            run.initializer
                .stage_baseline(&mut self.kernel, &run.host_root, &run.staging)
        });
        if let Err(e) = step {
            return Err(reject(&self.audit, e));
        }

        self.audit.record(
            SecurityEventType::NamespaceIsolated,
            format!("flags {:?}", run.initializer.clone_flags()),
        );
        Ok(self.advance(|Validated(run)| NamespaceIsolated(run)))
    }
}

impl<K: Kernel> Sandbox<NamespaceIsolated, K> {
    pub fn build_tree(mut self) -> Result<Sandbox<TreeBuilt, K>> {
        let run = &self.state.0;
        let applied = MountTreeBuilder::new(
            &mut self.kernel,
            &run.host_root,
            &run.staging,
            run.policy.clone(),
        )
        .and_then(|mut builder| builder.apply(&run.plan));
        let applied = match applied {
            Ok(applied) => applied,
            Err(e) => return Err(reject(&self.audit, e)),
        };

        self.audit.record(
            SecurityEventType::TreeBuilt,
            format!("{} of {} operations applied", applied, run.plan.len()),
        );
        Ok(self.advance(|NamespaceIsolated(run)| TreeBuilt(run)))
    }
}

impl<K: Kernel> Sandbox<TreeBuilt, K> {
    pub fn switch_root(mut self) -> Result<Sandbox<RootSwitched, K>> {
        let run = &self.state.0;
        if let Err(e) = RootSwitcher::new(&run.staging).switch(&mut self.kernel) {
            return Err(reject(&self.audit, e));
        }

        self.audit.record(
            SecurityEventType::RootSwitched,
            format!("new root {}", run.staging.display()),
        );
        Ok(self.advance(|TreeBuilt(run)| RootSwitched(run)))
    }
}

impl<K: Kernel> Sandbox<RootSwitched, K> {
    pub fn drop_privileges(mut self) -> Result<Sandbox<PrivilegeDropped, K>> {
        let run = &self.state.0;
        let (uid, gid) = run.initializer.final_ids(&run.identity);
        let dropper = PrivilegeDropper::new(run.model, uid, gid);
        if let Err(e) = dropper.drop_privileges(&mut self.kernel) {
            return Err(reject(&self.audit, e));
        }

        self.audit.record(
            SecurityEventType::PrivilegesDropped,
            format!("uid {} gid {} ({})", uid, gid, run.model),
        );
        Ok(self.advance(|RootSwitched(run)| PrivilegeDropped(run)))
    }
}

impl<K: Kernel> Sandbox<PrivilegeDropped, K> {
    pub fn launch_request(&self) -> LaunchRequest {
        let run = &self.state.0;
        let home = run.layout.home().as_path().to_path_buf();
        LaunchRequest {
            command: run.command.clone(),
            state_dir: home.clone(),
            home,
            container: run.layout.name().to_string(),
        }
    }

    /// The ONLY way to start the sandboxed program.
    pub fn handoff<L: Launcher>(self, launcher: &mut L) -> Result<()> {
        let request = self.launch_request();
        self.audit.record(
            SecurityEventType::Handoff,
            format!("exec {:?}", request.command),
        );
        launcher
            .launch(&request)
            .map_err(|e| reject(&self.audit, e))
    }
}

/// Drive the whole sequence. Returns only if the launcher fails or a step is
/// rejected.
pub fn run_sandbox<K: Kernel, L: Launcher>(
    kernel: K,
    config: SandboxConfig,
    launcher: &mut L,
) -> Result<()> {
    Sandbox::new(kernel, config)
        .validate()?
        .isolate()?
        .build_tree()?
        .switch_root()?
        .drop_privileges()?
        .handoff(launcher)
}

#[cfg(test)]
mod typestate_tests {
    use super::*;
    use crate::config::validator::HostPath;
    use crate::testing::recording::{KernelCall, RecordingKernel};
    use nix::mount::MsFlags;
    use nix::sched::CloneFlags;
    use nix::unistd::{Gid, Uid};
    use std::fs;
    use std::path::Path;

    #[derive(Default)]
    struct CapturingLauncher {
        requests: Vec<LaunchRequest>,
    }

    impl Launcher for CapturingLauncher {
        fn launch(&mut self, request: &LaunchRequest) -> Result<()> {
            self.requests.push(request.clone());
            Ok(())
        }
    }

    struct Host {
        root: tempfile::TempDir,
        staging: tempfile::TempDir,
    }

    impl Host {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            fs::create_dir_all(root.path().join("home/alice/Downloads")).unwrap();
            fs::create_dir_all(root.path().join("home/bob")).unwrap();
            fs::create_dir_all(root.path().join("var/tmp")).unwrap();
            fs::create_dir_all(root.path().join("var/lib")).unwrap();
            fs::create_dir_all(root.path().join("tmp")).unwrap();
            fs::write(root.path().join("home/alice/Downloads/a.txt"), b"a").unwrap();
            fs::write(root.path().join("home/alice/.bashrc"), b"secret").unwrap();
            Self {
                root,
                staging: tempfile::tempdir().unwrap(),
            }
        }

        fn config(&self, command: &[&str]) -> SandboxConfig {
            let mut config =
                SandboxConfig::new("browser", command.iter().map(OsString::from).collect());
            config.account = Some(Account {
                name: "alice".to_string(),
                uid: nix::unistd::getuid(),
                gid: nix::unistd::getgid(),
                home: HostPath::new("/home/alice").unwrap(),
            });
            config.model = Some(PrivilegeModel::UserNamespace);
            config.directives = vec![Directive::full("Downloads").unwrap()];
            config.host_root = self.root.path().to_path_buf();
            config.staging = self.staging.path().to_path_buf();
            config
        }

        fn kernel(&self) -> RecordingKernel {
            RecordingKernel::new(Identity::plain(4242, 4343)).emulating(self.staging.path())
        }
    }

    #[test]
    fn full_sequence_reaches_handoff() {
        let host = Host::new();
        let mut launcher = CapturingLauncher::default();

        let sandbox = Sandbox::new(host.kernel(), host.config(&["firefox", "--new-window"]))
            .validate()
            .unwrap()
            .isolate()
            .unwrap()
            .build_tree()
            .unwrap()
            .switch_root()
            .unwrap()
            .drop_privileges()
            .unwrap();

        let calls = sandbox.kernel().calls().to_vec();
        sandbox.handoff(&mut launcher).unwrap();

        assert_eq!(
            calls[0],
            KernelCall::CreateNamespace(CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNS)
        );
        let pivot = calls
            .iter()
            .position(|c| matches!(c, KernelCall::PivotRoot(..)))
            .unwrap();
        let set_identity = calls
            .iter()
            .position(|c| matches!(c, KernelCall::SetIdentity(..)))
            .unwrap();
        assert!(calls[..pivot].iter().any(KernelCall::is_mount));
        assert!(!calls[pivot..].iter().any(KernelCall::is_mount));
        assert!(pivot < set_identity);
        assert_eq!(
            calls[set_identity],
            KernelCall::SetIdentity(Uid::from_raw(1000), Gid::from_raw(1000))
        );

        let staged_home = host.staging.path().join("home/alice");
        assert!(staged_home.join("Downloads/a.txt").exists());
        assert!(!staged_home.join(".bashrc").exists());
        assert!(!host.staging.path().join("home/bob").exists());
        assert!(!host.staging.path().join("var/lib").exists());

        let request = &launcher.requests[0];
        assert_eq!(request.command, vec![OsString::from("firefox"), OsString::from("--new-window")]);
        assert_eq!(request.home, Path::new("/home/alice"));
        assert_eq!(request.container, "browser");
    }

    #[test]
    fn baseline_is_private_then_read_only() {
        let host = Host::new();
        let sandbox = Sandbox::new(host.kernel(), host.config(&["true"]))
            .validate()
            .unwrap()
            .isolate()
            .unwrap();

        let tail: Vec<_> = sandbox.kernel().calls().iter().rev().take(3).rev().cloned().collect();
        assert_eq!(
            tail,
            vec![
                KernelCall::MakePrivate(host.root.path().to_path_buf()),
                KernelCall::BindMount(host.root.path().to_path_buf(), host.staging.path().to_path_buf()),
                KernelCall::Remount(host.staging.path().to_path_buf(), MsFlags::MS_RDONLY),
            ]
        );
        assert!(host.root.path().join("home/alice/.cordon/browser").is_dir());
        assert!(host.root.path().join("var/tmp/cordon.alice.browser").is_dir());
    }

    #[test]
    fn invalid_name_is_rejected_before_any_change() {
        let host = Host::new();
        let mut config = host.config(&["true"]);
        config.container = "..".to_string();

        let sandbox = Sandbox::new(host.kernel(), config);
        let err = match sandbox.validate() {
            Err(e) => e,
            Ok(_) => panic!("'..' accepted as a container name"),
        };
        assert!(matches!(err, CordonError::Validation(_)));
        assert!(!host.root.path().join("home/alice/.cordon").exists());
    }

    #[test]
    fn wrong_posture_fails_before_namespace_change() {
        let host = Host::new();
        let mut config = host.config(&["true"]);
        config.model = Some(PrivilegeModel::Setuid);

        let kernel = host.kernel();
        let sandbox = Sandbox::new(kernel, config);
        assert!(matches!(
            sandbox.validate().err(),
            Some(CordonError::Precondition(_))
        ));
        assert!(!host.root.path().join("home/alice/.cordon").exists());
    }

    #[test]
    fn missing_command_is_a_usage_error() {
        let host = Host::new();
        let sandbox = Sandbox::new(host.kernel(), host.config(&[]));
        assert!(matches!(
            sandbox.validate().err(),
            Some(CordonError::Usage(_))
        ));
    }

    #[test]
    fn failed_mount_stops_the_sequence() {
        let host = Host::new();
        // 0: unshare, 1-3: id maps, 4: make-private, 5: baseline bind
        let kernel = host.kernel().failing_at(5);
        let result = Sandbox::new(kernel, host.config(&["true"]))
            .validate()
            .unwrap()
            .isolate();
        assert!(matches!(result.err(), Some(CordonError::Filesystem(_))));
    }

    #[test]
    fn nx_reaches_the_tree_policy() {
        let host = Host::new();
        let mut config = host.config(&["true"]);
        config.nx = true;
        let sandbox = Sandbox::new(host.kernel(), config).validate().unwrap();
        assert!(sandbox.run().policy.hide_flags.contains(MsFlags::MS_NOEXEC));
        assert!(!sandbox.run().policy.check_real_access);
    }

    #[test]
    fn audit_run_id_survives_transitions() {
        let host = Host::new();
        let sandbox = Sandbox::new(host.kernel(), host.config(&["true"]));
        let run_id = sandbox.audit().run_id().to_string();
        let sandbox = sandbox.validate().unwrap();
        assert_eq!(sandbox.audit().run_id(), run_id);
        assert_eq!(sandbox.audit().correlation().real_uid, Some(4242));
        let json = sandbox
            .audit()
            .event(SecurityEventType::PrivilegesDropped, "uid 1000")
            .to_json();
        assert_eq!(json["model"], "userns");
        assert_eq!(json["correlation"]["run_id"], run_id.as_str());
    }

    #[test]
    fn run_sandbox_hands_off_once() {
        let host = Host::new();
        let mut launcher = CapturingLauncher::default();
        run_sandbox(host.kernel(), host.config(&["true"]), &mut launcher).unwrap();
        assert_eq!(launcher.requests.len(), 1);
    }
}
