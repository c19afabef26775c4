use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;

use crate::project::{PROJECT_RC_NAME, ProjectMode};
use crate::services::{self, WebStackOptions};
use crate::session::{self, SessionContext};

/// Rebuild the interactive command set for the session's current mode. The
/// bus is cleared first so a reload that changes the mode never leaves stale
/// commands behind; re-registering an unchanged set is idempotent.
pub fn register_for_mode(ctx: &Arc<SessionContext>) {
    ctx.bus.clear();
    let Some(mode) = ctx.mode() else {
        return;
    };

    register_common(ctx);
    match mode {
        ProjectMode::MiniProgram => register_device_preview(ctx),
        ProjectMode::Plugin => {
            register_device_preview(ctx);
            register_plugin(ctx);
        }
        ProjectMode::PcPlugin => {
            register_device_preview(ctx);
            register_pc(ctx);
        }
        ProjectMode::H5 => register_web(ctx),
    }
}

fn register_common(ctx: &Arc<SessionContext>) {
    // `help` is hidden from the listing it prints.
    let help_ctx = ctx.clone();
    ctx.bus.subscribe_with("help", "", false, move |_args| {
        let ctx = help_ctx.clone();
        async move {
            session::print_tips(&ctx.bus);
            Ok(())
        }
        .boxed()
    });

    let update_ctx = ctx.clone();
    ctx.bus.subscribe(
        "updateConfig",
        &format!(
            "type `updateConfig <key> <value>` to patch {PROJECT_RC_NAME}, \
             e.g. `updateConfig miniAppId 5000001234`"
        ),
        move |args| {
            let ctx = update_ctx.clone();
            async move {
                let (Some(key), Some(value)) = (args.first(), args.get(1)) else {
                    println!("usage: updateConfig <key> <value>");
                    return Ok(());
                };
                crate::project::set_item(&ctx.config_path, key, value)
            }
            .boxed()
        },
    );

    let lint_ctx = ctx.clone();
    ctx.bus.subscribe(
        "lint",
        "type `lint` to check the project against the lint rules \
         (workbench plugins get extra checks)",
        move |_args| {
            let ctx = lint_ctx.clone();
            async move {
                ctx.collaborators.lint(&ctx.working_dir).await?;
                session::print_tips(&ctx.bus);
                Ok(())
            }
            .boxed()
        },
    );
}

// Commands shared by every project kind that previews on a device or in the
// IDE: miniProgram, plugin and pcPlugin.
fn register_device_preview(ctx: &Arc<SessionContext>) {
    let ide_ctx = ctx.clone();
    ctx.bus.subscribe(
        "ide",
        "type `ide` to debug the project in the Lyra IDE \
         (optionally `ide <path-to-ide>` to pick a local install)",
        move |args| {
            let ctx = ide_ctx.clone();
            async move {
                let ide_bin = args.first().map(PathBuf::from);
                ctx.collaborators
                    .launch_ide(&ctx.working_dir, ide_bin.as_deref())
                    .await?;
                session::print_tips(&ctx.bus);
                Ok(())
            }
            .boxed()
        },
    );

    let qrcode_ctx = ctx.clone();
    ctx.bus.subscribe(
        "qrcode",
        "type `qrcode` to generate a preview QR code",
        move |_args| {
            let ctx = qrcode_ctx.clone();
            async move {
                ctx.collaborators
                    .preview_qrcode(&ctx.working_dir, false)
                    .await?;
                session::print_tips(&ctx.bus);
                Ok(())
            }
            .boxed()
        },
    );

    let debug_ctx = ctx.clone();
    ctx.bus.subscribe(
        "qrcode:debug",
        "type `qrcode:debug` to generate an on-device debugging QR code",
        move |_args| {
            let ctx = debug_ctx.clone();
            async move {
                ctx.collaborators
                    .preview_qrcode(&ctx.working_dir, true)
                    .await?;
                println!(
                    "On-device debugging requires Android client 6.0.27+ or \
                     iOS client 6.0.1+; iOS plugins are not supported yet."
                );
                session::print_tips(&ctx.bus);
                Ok(())
            }
            .boxed()
        },
    );

    let upload_ctx = ctx.clone();
    ctx.bus.subscribe(
        "upload",
        "type `upload` to push the mini-program or workbench plugin to the \
         developer console",
        move |_args| {
            let ctx = upload_ctx.clone();
            async move {
                let mode = ctx.mode();
                if matches!(mode, Some(ProjectMode::Plugin | ProjectMode::PcPlugin)) {
                    ctx.collaborators.lint(&ctx.working_dir).await?;
                    println!("Workbench plugins must pass validation before uploading.");
                    if !ctx.collaborators.confirm("Continue with the upload?").await? {
                        return Ok(());
                    }
                }
                ctx.collaborators.upload(&ctx.working_dir).await?;
                session::print_tips(&ctx.bus);
                Ok(())
            }
            .boxed()
        },
    );
}

fn register_plugin(ctx: &Arc<SessionContext>) {
    let component_ctx = ctx.clone();
    ctx.bus.subscribe(
        "createPluginComponent",
        "type `createPluginComponent <name>` to scaffold a plugin component locally",
        move |args| {
            let ctx = component_ctx.clone();
            async move {
                let Some(name) = args.first() else {
                    println!("usage: createPluginComponent <name>");
                    return Ok(());
                };
                ctx.collaborators
                    .create_plugin_component(&ctx.working_dir, name)
                    .await
            }
            .boxed()
        },
    );

    let bundle_ctx = ctx.clone();
    ctx.bus.subscribe(
        "pluginH5Bundle",
        "type `pluginH5Bundle` to build the plugin H5 bundle and serve it locally",
        move |_args| {
            let ctx = bundle_ctx.clone();
            async move { ctx.collaborators.bundle_plugin_h5(&ctx.working_dir).await }.boxed()
        },
    );
}

fn register_pc(ctx: &Arc<SessionContext>) {
    let pc_ctx = ctx.clone();
    ctx.bus.subscribe(
        "pc",
        "type `pc` to preview the PC workbench plugin locally",
        move |_args| {
            let ctx = pc_ctx.clone();
            async move { ctx.collaborators.pc_preview(&ctx.working_dir).await }.boxed()
        },
    );
}

fn register_web(ctx: &Arc<SessionContext>) {
    let web_ctx = ctx.clone();
    ctx.bus.subscribe(
        "web",
        "type `web` to debug the H5 micro-app in a web browser",
        move |_args| {
            let ctx = web_ctx.clone();
            async move {
                let mut services = ctx.services.lock().await;
                if !services.is_empty() {
                    println!("Web preview is already running.");
                    return Ok(());
                }
                let handles = services::launch_web_stack(
                    WebStackOptions {
                        project_dir: ctx.working_dir.clone(),
                        target_h5_url: ctx.target_h5_url.clone(),
                    },
                    &ctx.tool_config.web,
                    ctx.collaborators.as_ref(),
                    ctx.diagnostics.clone(),
                )
                .await;
                services.extend(handles);
                Ok(())
            }
            .boxed()
        },
    );
}
