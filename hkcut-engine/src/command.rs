use std::collections::HashMap;

use hkcut_core::document::PartId;

use crate::job::Job;

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub job: &'a mut Job,
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(ReorderCommand);
        bus.register(ReorderContoursCommand);
        bus.register(SkeletonCommand);
        bus.register(BreakupCommand);
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    pub fn available_commands(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

/// 逗号或空白分隔的零件编号。
pub fn parse_part_ids<S: AsRef<str>>(args: &[S]) -> Result<Vec<PartId>, String> {
    parse_numbers(args, "零件编号").map(|raw| raw.into_iter().map(PartId::new).collect())
}

fn parse_numbers<S: AsRef<str>>(args: &[S], what: &str) -> Result<Vec<u32>, String> {
    args.iter()
        .flat_map(|arg| {
            arg.as_ref()
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .map(|token| {
            token
                .parse::<u32>()
                .map_err(|_| format!("无效的{what}: {token}"))
        })
        .collect()
}

struct ReorderCommand;

impl CommandHandler for ReorderCommand {
    fn name(&self) -> &'static str {
        "reorder"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let order = match parse_part_ids(&request.args) {
            Ok(order) => order,
            Err(message) => return CommandResponse::err(message),
        };
        match context.job.reorder(&order) {
            Ok(()) => CommandResponse::ok(format!("零件已重排，共 {} 个", order.len())),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

/// 参数：零件编号，随后是该零件轮廓的新顺序。
struct ReorderContoursCommand;

impl CommandHandler for ReorderContoursCommand {
    fn name(&self) -> &'static str {
        "reorder_contours"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let Some((part, rest)) = request.args.split_first() else {
            return CommandResponse::err("缺少零件编号");
        };
        let part = match parse_part_ids(std::slice::from_ref(part)).as_deref() {
            Ok([part]) => *part,
            Ok(_) => return CommandResponse::err(format!("无效的零件编号: {part}")),
            Err(message) => return CommandResponse::err(message.clone()),
        };
        let order: Vec<usize> = match parse_numbers(rest, "轮廓序号") {
            Ok(raw) => raw.into_iter().map(|value| value as usize).collect(),
            Err(message) => return CommandResponse::err(message),
        };
        match context.job.reorder_contours(part, &order) {
            Ok(()) => CommandResponse::ok(format!(
                "零件 {part} 的轮廓已重排，共 {} 个",
                order.len()
            )),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct SkeletonCommand;

impl CommandHandler for SkeletonCommand {
    fn name(&self) -> &'static str {
        "skeleton"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.job.skeleton() {
            Ok(skeleton) => CommandResponse::ok(format!(
                "余料区域 {} 个多边形，面积 {:.4}",
                skeleton.region.polygons().len(),
                skeleton.region.area()
            )),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct BreakupCommand;

impl CommandHandler for BreakupCommand {
    fn name(&self) -> &'static str {
        "breakup"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.job.breakup() {
            Ok(plan) => CommandResponse::ok(format!(
                "已生成 {} 条分离线段，告警 {} 条",
                plan.segment_count(),
                plan.warnings.len()
            )),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}
