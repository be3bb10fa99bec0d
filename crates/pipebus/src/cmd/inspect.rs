use pipebus_wire::{DataHead, FLAG_BEGIN, FLAG_CHUNK, FLAG_END};
use zerocopy::FromZeroes;

use crate::cmd::InspectArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_head, OutputFormat};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let head = build_head(&args);
    print_head(&head, format);
    Ok(SUCCESS)
}

fn build_head(args: &InspectArgs) -> DataHead {
    let mut head = DataHead::new_zeroed();
    head.fd = args.fd;
    head.msg_id = args.msg_id;
    head.len = args.len;
    head.reactor_id = args.reactor_id;
    head.type_tag = args.type_tag;
    head.server_fd = args.server_fd;
    head.ext_flags = args.ext_flags;
    if args.chunk {
        head.flags |= FLAG_CHUNK;
    }
    if args.begin {
        head.flags |= FLAG_BEGIN;
    }
    if args.end {
        head.flags |= FLAG_END;
    }
    head.stamp();
    head
}
