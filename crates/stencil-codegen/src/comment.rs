//! Debug output for comment nodes.

use stencil_parser::CommentNode;

use crate::{CodegenError, Compile, Compiler};

impl Compile for CommentNode {
    /// Writes exposed comments as a block comment in debug mode; otherwise
    /// writes nothing.
    fn compile(&self, compiler: &mut Compiler) -> Result<(), CodegenError> {
        if !compiler.is_debug() || !self.exposed() {
            return Ok(());
        }

        compiler.raw(&format!("/* comment on line {}\n", self.line()));
        for line in self.text().split('\n') {
            compiler.raw(&strip_comment_close(line)).raw("\n");
        }
        compiler.raw("*/\n");
        Ok(())
    }
}

fn strip_comment_close(line: &str) -> String {
    let mut line = line.to_string();
    // Removing one `*/` can join a new one (`**//`).
    while line.contains("*/") {
        line = line.replace("*/", "");
    }
    line
}
