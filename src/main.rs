fn main() {
    pampax::cli::run()
}
