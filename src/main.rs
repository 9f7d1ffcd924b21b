// src/main.rs
//! jni-frame: print the managed or JNI frame layout of a method.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use jni_callconv::{
    Error, FrameOffset, InstructionSet, JniCallingConvention, JniFrameReport, ManagedFrameReport,
    ManagedRuntimeCallingConvention, MethodDescriptor, MethodFlags, Result,
};

#[derive(Debug, clap::Parser, Clone)]
#[command(version, about)]
struct Args {
    /// Target instruction set (arm, thumb2, arm64, mips, mips64)
    #[arg(long, default_value = "arm")]
    isa: InstructionSet,
    /// The method is static
    #[arg(long = "static")]
    is_static: bool,
    /// The method is synchronized
    #[arg(long)]
    synchronized: bool,
    /// The method is annotated @CriticalNative
    #[arg(long)]
    critical_native: bool,
    /// Describe the managed entry instead of the native call
    #[arg(long)]
    managed: bool,
    /// Offset of the ArtMethod* from the stack pointer. Defaults to the
    /// outgoing argument size for JNI and 0 for managed frames.
    #[arg(long)]
    displacement: Option<usize>,
    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,
    /// JSON file holding an array of `{"shorty": ..., "flags": ...}` methods
    #[arg(long, conflicts_with = "shorty")]
    batch: Option<PathBuf>,
    /// Method shorty, return type first (e.g. `VIJ`)
    #[arg(required_unless_present = "batch")]
    shorty: Option<String>,
}

impl Args {
    fn methods(&self) -> Result<Vec<MethodDescriptor>> {
        if let Some(path) = &self.batch {
            let batch_error = |message: String| Error::Batch {
                path: path.display().to_string(),
                message,
            };
            let text = std::fs::read_to_string(path).map_err(|e| batch_error(e.to_string()))?;
            let methods: Vec<MethodDescriptor> =
                serde_json::from_str(&text).map_err(|e| batch_error(e.to_string()))?;
            log::debug!("loaded {} methods from {}", methods.len(), path.display());
            return Ok(methods);
        }
        let mut flags = MethodFlags::NATIVE;
        flags.set(MethodFlags::STATIC, self.is_static);
        flags.set(MethodFlags::SYNCHRONIZED, self.synchronized);
        flags.set(MethodFlags::CRITICAL_NATIVE, self.critical_native);
        let shorty = self.shorty.clone().unwrap_or_default();
        Ok(vec![MethodDescriptor::new(shorty, flags)])
    }
}

enum Report {
    Jni(JniFrameReport),
    Managed(ManagedFrameReport),
}

fn report(args: &Args, method: &MethodDescriptor) -> Result<Report> {
    if args.managed {
        let conv = ManagedRuntimeCallingConvention::create(
            method.flags.is_static(),
            method.flags.is_synchronized(),
            &method.shorty,
            args.isa,
        )?;
        let displacement = FrameOffset(args.displacement.unwrap_or(0));
        Ok(Report::Managed(ManagedFrameReport::new(&conv, displacement)))
    } else {
        let conv = JniCallingConvention::for_method(method, args.isa)?;
        let displacement = match args.displacement {
            Some(given) => conv.check_displacement(FrameOffset(given))?,
            None => FrameOffset(conv.out_arg_size()),
        };
        Ok(Report::Jni(JniFrameReport::with_displacement(
            &conv,
            displacement,
        )))
    }
}

fn run<W: Write>(mut out: W, args: &Args) -> Result<()> {
    let reports = args
        .methods()?
        .iter()
        .map(|method| report(args, method))
        .collect::<Result<Vec<_>>>()?;

    let written = if args.json {
        let mut values = reports
            .iter()
            .map(|report| match report {
                Report::Jni(report) => serde_json::to_value(report),
                Report::Managed(report) => serde_json::to_value(report),
            })
            .collect::<serde_json::Result<Vec<_>>>()
            .map_err(|e| Error::Output(e.to_string()))?;
        let value = match values.pop() {
            Some(single) if values.is_empty() && args.batch.is_none() => single,
            Some(last) => {
                values.push(last);
                serde_json::Value::Array(values)
            }
            None => serde_json::Value::Array(values),
        };
        writeln!(out, "{:#}", value)
    } else {
        reports.iter().try_for_each(|report| match report {
            Report::Jni(report) => writeln!(out, "{}", report),
            Report::Managed(report) => writeln!(out, "{}", report),
        })
    };
    written.map_err(|e| Error::Output(e.to_string()))
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let stdout = std::io::stdout();
    match run(stdout.lock(), &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("jni-frame: {}", error);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with(argv: &[&str]) -> Result<String> {
        let args = Args::try_parse_from(argv).unwrap();
        let mut out = Vec::new();
        run(&mut out, &args)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_text_report() {
        let text = run_with(&["jni-frame", "--static", "VIJ"]).unwrap();
        assert!(text.starts_with("jni arm VIJ static"));
        assert!(text.contains("frame size:      112"));
    }

    #[test]
    fn test_json_report() {
        let text = run_with(&["jni-frame", "--isa", "arm64", "--json", "V"]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["frame_size"], 192);
    }

    #[test]
    fn test_managed_report() {
        let text = run_with(&["jni-frame", "--managed", "--isa", "mips", "--static", "VJ"]).unwrap();
        assert!(text.contains("a2 4 bytes"));
    }

    #[test]
    fn test_rejects_x86() {
        assert_eq!(
            run_with(&["jni-frame", "--isa", "x86", "V"]),
            Err(Error::UnsupportedInstructionSet(InstructionSet::X86))
        );
    }

    #[test]
    fn test_rejects_displacement_outside_out_area() {
        // Three ints on the stack at 0, 4 and 8 of a 16 byte outgoing area.
        assert_eq!(
            run_with(&["jni-frame", "--static", "--displacement", "0", "VIIIII"]),
            Err(Error::Displacement {
                given: 0,
                min: 16,
                max: 23
            })
        );
        assert!(matches!(
            run_with(&["jni-frame", "--static", "--displacement", "24", "VIIIII"]),
            Err(Error::Displacement { given: 24, .. })
        ));
    }

    #[test]
    fn test_displacement_shifts_stack_arguments() {
        let text = run_with(&["jni-frame", "--static", "--json", "--displacement", "20", "VIIIII"])
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["arguments"][4]["placement"]["stack"], 4);
        assert_eq!(value["arguments"][6]["placement"]["stack"], 12);

        // Without stack arguments any displacement is accepted.
        assert!(run_with(&["jni-frame", "--static", "--displacement", "0", "VI"]).is_ok());
    }

    #[test]
    fn test_missing_batch_file() {
        let result = run_with(&["jni-frame", "--batch", "/nonexistent/methods.json"]);
        assert!(matches!(result, Err(Error::Batch { .. })));
    }
}
