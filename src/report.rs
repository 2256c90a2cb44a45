use crate::{build::FreezePlan, cli};

pub fn build_report(plan: &FreezePlan, mode: cli::ReportMode) -> String {
    match mode {
        cli::ReportMode::Off => String::new(),
        cli::ReportMode::Summary => summary(plan),
        cli::ReportMode::Full => format!("{plan:#?}"),
    }
}

fn summary(plan: &FreezePlan) -> String {
    let mut out = String::new();

    out.push_str("saltfreeze report (summary)\n");
    out.push_str("===========================\n");
    out.push_str(&format!(
        "build_type: {} (configured: {})\n",
        plan.build.effective_build_type(),
        plan.build.build_type()
    ));
    out.push_str(&format!("platform: {}\n", plan.build.platform()));
    out.push_str(&format!("framework: {}\n", plan.build.version()));
    out.push_str(&format!(
        "prefix: {} (rename_minion={})\n",
        plan.build.prefix(),
        plan.build.rename_minion()
    ));
    out.push_str(&format!("template: {}\n", plan.template.origin()));

    out.push_str(&format!("\nroots: {}\n", plan.roots.len()));
    for r in &plan.roots {
        let kind = if r.is_package() { "package" } else { "module" };
        let opt = if r.optional { ", optional" } else { "" };
        out.push_str(&format!(
            "  - {} ({kind}{opt}) {}\n",
            r.name,
            r.filesystem_path.display()
        ));
    }

    out.push_str(&format!(
        "\nincludes: required={} optional={}\n",
        plan.closure.required.len(),
        plan.closure.optional.len()
    ));

    out.push_str(&format!("\nlaunchers: {}\n", plan.launchers.len()));
    for (name, s) in &plan.launchers {
        out.push_str(&format!(
            "  - {} -> {}.{}\n",
            name, s.entry_import.module, s.entry_import.callable
        ));
    }

    out
}
