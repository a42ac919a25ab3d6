pub mod breakup;
pub mod command;
pub mod polygon;
pub mod reorder;
pub mod skeleton;

pub use breakup::{
    BreakupLine, BreakupOutcome, BreakupParams, BreakupPlan, BreakupSegment, BreakupWarning,
    Orientation, generate_breakup, plan_breakup,
};
pub use reorder::{reorder, reorder_contours, validate_contour_order, validate_order};
pub use skeleton::{Skeleton, SkeletonRegion, compute_skeleton, compute_skeleton_with};

pub mod errors {
    use hkcut_core::document::{GeometryError, PartId};
    use thiserror::Error;

    /// 重排顺序不是当前零件（或某零件轮廓）集合上的排列。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum ValidationError {
        #[error("part {0} is not in the program")]
        UnknownPart(PartId),
        #[error("part {0} appears more than once in the new order")]
        DuplicatePart(PartId),
        #[error("part {0} is missing from the new order")]
        MissingPart(PartId),
        #[error("part {part} has no contour {contour}")]
        UnknownContour { part: PartId, contour: usize },
        #[error("contour {contour} of part {part} appears more than once in the new order")]
        DuplicateContour { part: PartId, contour: usize },
        #[error("contour {contour} of part {part} is missing from the new order")]
        MissingContour { part: PartId, contour: usize },
        #[error("reordered program failed validation: {0}")]
        Rebuild(#[from] GeometryError),
    }

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("no program is loaded")]
        DocumentNotInitialized,
        #[error(transparent)]
        Validation(#[from] ValidationError),
        #[error(transparent)]
        Geometry(#[from] GeometryError),
    }
}

pub use errors::{EngineError, ValidationError};

pub mod job {
    use hkcut_core::document::{Document, PartId};
    use tracing::debug;

    use crate::breakup::{BreakupParams, BreakupPlan, generate_breakup};
    use crate::errors::EngineError;
    use crate::reorder::{reorder, reorder_contours};
    use crate::skeleton::{Skeleton, compute_skeleton};

    /// 单个切割程序的处理状态：当前文档、缓存的余料与最近一次分离线方案。
    #[derive(Debug, Default)]
    pub struct Job {
        document: Option<Document>,
        skeleton: Option<Skeleton>,
        last_plan: Option<BreakupPlan>,
        params: BreakupParams,
    }

    impl Job {
        pub fn new() -> Self {
            Self::default()
        }

        /// 使用现有文档初始化。
        pub fn with_document(document: Document) -> Self {
            let mut job = Self::new();
            job.load_document(document);
            job
        }

        pub fn with_params(mut self, params: BreakupParams) -> Self {
            self.params = params;
            self
        }

        /// 替换当前文档并清空派生状态。
        pub fn load_document(&mut self, document: Document) {
            debug!(parts = document.parts().len(), "载入文档");
            self.document = Some(document);
            self.skeleton = None;
            self.last_plan = None;
        }

        #[inline]
        pub fn document(&self) -> Option<&Document> {
            self.document.as_ref()
        }

        pub fn require_document(&self) -> Result<&Document, EngineError> {
            self.document
                .as_ref()
                .ok_or(EngineError::DocumentNotInitialized)
        }

        #[inline]
        pub fn params(&self) -> &BreakupParams {
            &self.params
        }

        #[inline]
        pub fn last_plan(&self) -> Option<&BreakupPlan> {
            self.last_plan.as_ref()
        }

        /// 重排零件。失败时文档保持不变。
        pub fn reorder(&mut self, order: &[PartId]) -> Result<(), EngineError> {
            let reordered = reorder(self.require_document()?, order)?;
            self.document = Some(reordered);
            // 余料与零件顺序无关，缓存保留
            self.last_plan = None;
            Ok(())
        }

        /// 重排某个零件内的轮廓。零件几何不变，余料缓存保留。
        pub fn reorder_contours(&mut self, part: PartId, order: &[usize]) -> Result<(), EngineError> {
            let reordered = reorder_contours(self.require_document()?, part, order)?;
            self.document = Some(reordered);
            self.last_plan = None;
            Ok(())
        }

        /// 计算余料并缓存。
        pub fn skeleton(&mut self) -> Result<&Skeleton, EngineError> {
            if self.skeleton.is_none() {
                let skeleton = compute_skeleton(self.require_document()?)?;
                self.skeleton = Some(skeleton);
            }
            self.skeleton
                .as_ref()
                .ok_or(EngineError::DocumentNotInitialized)
        }

        /// 生成分离线并替换当前文档，返回方案。
        pub fn breakup(&mut self) -> Result<&BreakupPlan, EngineError> {
            let skeleton = self.skeleton()?.clone();
            let outcome = generate_breakup(self.require_document()?, &skeleton, &self.params)?;
            self.document = Some(outcome.document);
            // 分离线零件没有材料，余料不变
            self.last_plan = Some(outcome.plan);
            self.last_plan
                .as_ref()
                .ok_or(EngineError::DocumentNotInitialized)
        }
    }

}
