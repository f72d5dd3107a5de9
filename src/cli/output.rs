use crate::cli::commands::ToolReport;
use crate::cli::options::OutputFormat;
use crate::pipeline::{PipelineResult, PipelineSummary};

/// Print the outcome of one pipeline run.
pub fn print_pipeline_result(result: &PipelineResult, format: OutputFormat) -> serde_json::Result<()> {
    let summary = result.summary();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => print_summary_text(&summary),
    }
    Ok(())
}

fn print_summary_text(summary: &PipelineSummary) {
    if summary.success {
        println!("✅ Repackaged successfully");
        if let Some(artifact) = &summary.artifact {
            println!("  • Output: {}", artifact.display());
        }
        if let Some(sha256) = &summary.sha256 {
            println!("  • SHA-256: {}", sha256);
        }
        match summary.signed {
            Some(true) => println!("  • Signed: yes"),
            _ => println!("  • Signed: no"),
        }
    } else if let Some(failure) = &summary.failure {
        println!("❌ Failed during {}: {}", failure.stage, failure.message);
        if let Some(diagnostics) = &failure.diagnostics {
            println!();
            println!("Tool output:");
            for line in diagnostics.lines() {
                println!("  {}", line);
            }
        }
    }

    for warning in &summary.warnings {
        println!("⚠️  {}", warning);
    }
    if let Some(workspace) = &summary.workspace {
        println!("  • Workspace: {}", workspace.display());
    }
    println!("  • Duration: {} ms", summary.duration_ms);
}

pub fn print_tool_report(report: &ToolReport, format: OutputFormat) -> serde_json::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            println!("🔧 External Tools");
            for tool in &report.tools {
                let icon = if tool.available { "✅" } else { "❌" };
                let status = if tool.available { "Available" } else { "Missing" };
                println!("  {} {} ({}): {}", icon, tool.role, tool.program, status);
            }
        }
    }
    Ok(())
}
