//! The users/groups verification suite.
//!
//! Provisions an instance with the canonical users/groups payload and
//! verifies the resulting identity database, group membership, boot
//! warnings, password-unlock reconciliation across a reboot, and sudoers
//! include idempotence. Check order matters: the password-deletion check
//! mutates state and reboots, and the checks after it rely on that history.

use crate::instance::TargetInstance;
use crate::release::{JAMMY, NOBLE};
use crate::suite::{Check, CheckFuture, Suite, SuiteContext};
use crate::user_data::sample_users_groups;
use crate::verify::{CheckOutcome, Probe, ProbeError, mutate_and_restart, run_probe, verify_clean_boot};

/// Managed sudoers fragment installed by the provisioner.
pub const MANAGED_SUDOERS_FRAGMENT: &str = "/etc/sudoers.d/90-cloud-init-users";

/// Identity-database expectations probed via `getent`.
///
/// Every pattern is searched, not fully matched, so prefixes suffice.
const GETENT_EXPECTATIONS: &[(&[&str], &str)] = &[
    (&["getent", "group", "ubuntu"], r"ubuntu:x:[0-9]{4}:"),
    (
        &["getent", "group", "cloud-users"],
        r"cloud-users:x:[0-9]{4}:barfoo",
    ),
    (
        &["getent", "passwd", "ubuntu"],
        r"ubuntu:x:[0-9]{4}:[0-9]{4}:Ubuntu:/home/ubuntu:/bin/bash",
    ),
    (
        &["getent", "passwd", "foobar"],
        r"foobar:x:[0-9]{4}:[0-9]{4}:Foo B. Bar:/home/foobar:",
    ),
    (
        &["getent", "passwd", "barfoo"],
        r"barfoo:x:[0-9]{4}:[0-9]{4}:Bar B. Foo:/home/barfoo:",
    ),
    (&["getent", "passwd", "cloudy"], r"cloudy:x:[0-9]{3,4}:"),
    (&["getent", "passwd", "eric"], r"eric:x:1742:"),
    (&["getent", "passwd", "archivist"], r"archivist:x:1743:"),
    (
        &["getent", "passwd", "nopassworduser"],
        r"nopassworduser:x:[0-9]{4}:[0-9]{4}:I do not like passwords",
    ),
];

/// Warning emitted on first boot for a new user declared unlocked but
/// without any password material.
#[must_use]
pub fn new_user_empty_passwd_warning(username: &str) -> String {
    format!(
        "Not unlocking password for user {username}. 'lock_passwd: false' present in user-data \
         but no 'passwd'/'plain_text_passwd'/'hashed_passwd' provided in user-data"
    )
}

/// Warning emitted on later boots for a pre-existing account whose password
/// is blank while user-data still requests an unlocked account.
#[must_use]
pub fn existing_user_empty_passwd_warning(username: &str) -> String {
    format!(
        "Not unlocking blank password for existing user {username}. 'lock_passwd: false' present \
         in user-data but no existing password set and no \
         'plain_text_passwd'/'hashed_passwd' provided in user-data"
    )
}

/// Probes one `getent` expectation; applies only to Ubuntu family targets
/// because the table assumes the `ubuntu` default user.
struct GetentCheck {
    name: String,
    probe: Probe,
}

impl GetentCheck {
    fn new(args: &[&str], pattern: &str) -> Result<Self, ProbeError> {
        let probe = Probe::new(args.iter().copied(), pattern)?;
        Ok(Self {
            name: probe.command_line(),
            probe,
        })
    }
}

impl<I: TargetInstance> Check<I> for GetentCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(&'a self, cx: &'a SuiteContext<I>) -> CheckFuture<'a> {
        Box::pin(async move {
            if !cx.release.is_ubuntu {
                return Ok(CheckOutcome::skipped(
                    "expectations assume the 'ubuntu' default user",
                ));
            }
            run_probe(&cx.instance, &self.probe)
        })
    }
}

/// Verifies the first boot produced exactly the expected warnings.
struct InitialWarningsCheck;

impl<I: TargetInstance> Check<I> for InitialWarningsCheck {
    fn name(&self) -> &str {
        "initial boot warnings"
    }

    fn run<'a>(&'a self, cx: &'a SuiteContext<I>) -> CheckFuture<'a> {
        Box::pin(async move {
            // The missing-password warning only ships on releases newer
            // than noble; earlier targets must boot without warnings.
            let warnings = if cx.release.version > NOBLE {
                vec![new_user_empty_passwd_warning("nopassworduser")]
            } else {
                Vec::new()
            };
            verify_clean_boot(&cx.instance, &warnings, false)
        })
    }
}

/// Verifies root was added to the payload-declared `secret` group.
struct RootInSecretCheck;

impl<I: TargetInstance> Check<I> for RootInSecretCheck {
    fn name(&self) -> &str {
        "root user in secret group"
    }

    fn run<'a>(&'a self, cx: &'a SuiteContext<I>) -> CheckFuture<'a> {
        Box::pin(async move {
            let output = cx.instance.execute(&["groups", "root"])?;
            let Some((_, groups_text)) = output.stdout.split_once(':') else {
                return Ok(CheckOutcome::failed(format!(
                    "`groups root` produced unparseable output: '{}'",
                    output.stdout.trim_end()
                )));
            };
            if groups_text.split_whitespace().any(|group| group == "secret") {
                Ok(CheckOutcome::Passed)
            } else {
                Ok(CheckOutcome::failed(format!(
                    "expected root to be in group 'secret', got: '{}'",
                    groups_text.trim()
                )))
            }
        })
    }
}

/// Deletes foobar's password, reboots, and verifies the provisioner warns
/// about blank passwords on pre-existing accounts instead of unlocking them.
struct NoPasswordUnlockCheck;

impl<I: TargetInstance> Check<I> for NoPasswordUnlockCheck {
    fn name(&self) -> &str {
        "blank password unlock warnings after reboot"
    }

    fn run<'a>(&'a self, cx: &'a SuiteContext<I>) -> CheckFuture<'a> {
        Box::pin(async move {
            // Fake an admin clearing foobar's password so the next boot sees
            // an existing account with a blank password and an unlock request.
            mutate_and_restart(&cx.instance, "sudo passwd -d foobar").await?;

            let warnings = if cx.release.version > NOBLE {
                vec![
                    existing_user_empty_passwd_warning("nopassworduser"),
                    existing_user_empty_passwd_warning("foobar"),
                ]
            } else {
                Vec::new()
            };
            // Re-running against existing groups produces chatter we do not
            // care about here.
            verify_clean_boot(&cx.instance, &warnings, true)
        })
    }
}

/// Verifies the sudoers include directive is not duplicated when the active
/// sudoers file uses the `@includedir` marker style, and that the managed
/// fragment survives the re-run untouched.
struct SudoersIncludeCheck;

impl SudoersIncludeCheck {
    fn fragment_body(contents: &str) -> Vec<String> {
        // The header line carries a generation timestamp; skip it.
        contents.lines().skip(1).map(str::to_owned).collect()
    }
}

impl<I: TargetInstance> Check<I> for SudoersIncludeCheck {
    fn name(&self) -> &str {
        "sudoers includedir idempotence"
    }

    fn run<'a>(&'a self, cx: &'a SuiteContext<I>) -> CheckFuture<'a> {
        Box::pin(async move {
            if cx.release.version < JAMMY {
                return Ok(CheckOutcome::skipped(
                    "requires a sudo version that understands @includedir",
                ));
            }

            cx.instance
                .execute_shell("sudo sed -i 's/#include/@include/g' /etc/sudoers")?;

            let fragment_before = Self::fragment_body(
                &cx.instance.read_from_file(MANAGED_SUDOERS_FRAGMENT)?,
            );
            let sudoers = cx.instance.read_from_file("/etc/sudoers")?;
            if !sudoers.contains("@includedir /etc/sudoers.d") {
                cx.instance.execute_shell(
                    "echo '@includedir /etc/sudoers.d' | sudo tee -a /etc/sudoers",
                )?;
            }

            cx.instance.clean()?;
            cx.instance.restart().await?;

            let sudoers_after = cx.instance.read_from_file("/etc/sudoers")?;
            if sudoers_after.contains("#includedir") {
                return Ok(CheckOutcome::failed(
                    "sudoers gained a #includedir directive after re-run",
                ));
            }
            let include_count = sudoers_after.matches("includedir /etc/sudoers.d").count();
            if include_count != 1 {
                return Ok(CheckOutcome::failed(format!(
                    "expected exactly one includedir directive, found {include_count}"
                )));
            }

            let fragment_after = Self::fragment_body(
                &cx.instance.read_from_file(MANAGED_SUDOERS_FRAGMENT)?,
            );
            if fragment_before != fragment_after {
                return Ok(CheckOutcome::failed(format!(
                    "managed sudoers fragment changed across re-run: before {fragment_before:?}, \
                     after {fragment_after:?}"
                )));
            }

            Ok(CheckOutcome::Passed)
        })
    }
}

/// Builds the users/groups suite: the canonical payload plus its ordered
/// verification checks.
///
/// # Errors
///
/// Returns [`ProbeError`] when a built-in expectation pattern fails to
/// compile, which indicates a defect in the table itself.
pub fn suite<I: TargetInstance + 'static>() -> Result<Suite<I>, ProbeError> {
    let mut checks: Vec<Box<dyn Check<I>>> = Vec::new();
    for (args, pattern) in GETENT_EXPECTATIONS {
        checks.push(Box::new(GetentCheck::new(args, pattern)?));
    }
    checks.push(Box::new(InitialWarningsCheck));
    checks.push(Box::new(RootInSecretCheck));
    checks.push(Box::new(NoPasswordUnlockCheck));
    checks.push(Box::new(SudoersIncludeCheck));

    Ok(Suite {
        name: "users-groups".to_owned(),
        user_data: sample_users_groups(),
        checks,
    })
}
