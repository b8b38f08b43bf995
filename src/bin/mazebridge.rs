use mazebridge::{logging, Bridge, BridgeConfig, TypeTag, Value, WasmModule};
use std::path::PathBuf;
use tracing::{debug, error, info};

#[derive(Debug)]
struct Config {
    function: String,
    config_path: Option<PathBuf>,
    module_path: Option<PathBuf>,
    returns: TypeTag,
    args: Vec<(TypeTag, Value)>,
    max_depth: Option<usize>,
}

impl Config {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().collect();
        let prog = args.first().map(String::as_str).unwrap_or("mazebridge");

        let mut function = None;
        let mut config_path = None;
        let mut module_path = None;
        let mut returns = TypeTag::Void;
        let mut call_args = Vec::new();
        let mut max_depth = None;

        let mut rest = args.iter().skip(1);
        while let Some(arg) = rest.next() {
            let flag = arg.as_str();
            let mut value = |flag: &str| {
                rest.next()
                    .cloned()
                    .ok_or_else(|| format!("{} needs a value\n\n{}", flag, Self::usage(prog)))
            };
            match flag {
                "--help" | "-h" => return Err(Self::usage(prog)),
                "--config" | "-c" => config_path = Some(PathBuf::from(value(flag)?)),
                "--module" | "-m" => module_path = Some(PathBuf::from(value(flag)?)),
                "--returns" | "-r" => returns = parse_tag(&value(flag)?)?,
                "--arg" | "-a" => call_args.push(parse_arg(&value(flag)?)?),
                "--max-depth" => {
                    let text = value(flag)?;
                    max_depth = Some(text.parse::<usize>().map_err(|_| format!("invalid depth: {}", text))?);
                }
                name if !name.starts_with('-') && function.is_none() => function = Some(name.to_string()),
                opt => return Err(format!("Unknown option: {}\n\n{}", opt, Self::usage(prog))),
            }
        }

        let function = function.ok_or_else(|| format!("No function specified\n\n{}", Self::usage(prog)))?;
        Ok(Self {
            function,
            config_path,
            module_path,
            returns,
            args: call_args,
            max_depth,
        })
    }

    fn usage(prog: &str) -> String {
        format!(
            "mazebridge - call a wasm export with structured arguments\n\n\
            USAGE:\n    {} [OPTIONS] <function>\n\n\
            OPTIONS:\n    \
            -h, --help              Print help information\n    \
            -c, --config <file>     Bridge config (default: nearest mazebridge.toml)\n    \
            -m, --module <file>     Wasm module, overrides [module].path\n    \
            -r, --returns <tag>     Return type tag (default: void)\n    \
            -a, --arg <tag>=<json>  Argument, repeatable, in call order\n    \
            --max-depth <n>         Pointer depth limit when reading results\n\n\
            EXAMPLES:\n    \
            {} -m solver.wasm -r i32 -a i32=2 -a i32=3 add\n    \
            {} -c maze.toml -r Point -a 'Point={{\"x\":1,\"y\":2}}' identity",
            prog, prog, prog
        )
    }
}

fn parse_tag(text: &str) -> Result<TypeTag, String> {
    text.parse().map_err(|e| format!("{}", e))
}

fn parse_arg(text: &str) -> Result<(TypeTag, Value), String> {
    let (tag, json) = text
        .split_once('=')
        .ok_or_else(|| format!("argument `{}` is not <tag>=<json>", text))?;
    let value = serde_json::from_str(json).map_err(|e| format!("argument `{}`: {}", text, e))?;
    Ok((parse_tag(tag)?, value))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let cli = match Config::from_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    debug!(?cli, "arguments parsed");

    let mut config = match &cli.config_path {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::discover()?.unwrap_or_default(),
    };
    if let Some(depth) = cli.max_depth {
        config.bridge.max_depth = depth;
    }

    let module_path = cli
        .module_path
        .clone()
        .or_else(|| config.module.path.clone())
        .ok_or("no module given: pass --module or set [module].path")?;
    info!(module = %module_path.display(), "loading module");

    let module = WasmModule::from_file(&module_path, &config.exports())?;
    let mut bridge = Bridge::from_config(module, &config)?;

    let (tags, values): (Vec<TypeTag>, Vec<Value>) = cli.args.into_iter().unzip();
    match bridge.invoke(&cli.function, &cli.returns, &tags, &values) {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            debug!(stats = ?bridge.stats(), "call complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, function = %cli.function, "call failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
